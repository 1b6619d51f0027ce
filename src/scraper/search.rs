use crate::scraper::{PageFetcher, ScraperError};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Results per search page; the site pages with `index=0, 24, 48, ...`.
pub const RESULTS_PER_PAGE: u32 = 24;

const CARD_SELECTOR: &str = "div[class*='PropertyCard_propertyCardContainer']";
const LINK_SELECTOR: &str = "a[href*='/properties/']";

/// Listing URLs gathered from the search result pages.
#[derive(Debug, Default)]
pub struct SearchResult {
    pub listing_urls: Vec<String>,
    pub pages_fetched: usize,
}

/// URL of the given 1-based search page.
pub fn page_url(search_url: &Url, page: u32) -> Url {
    let index = (page.saturating_sub(1) * RESULTS_PER_PAGE).to_string();

    let pairs: Vec<(String, String)> = search_url
        .query_pairs()
        .filter(|(k, _)| k != "index")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = search_url.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
        query.append_pair("index", &index);
    }
    url
}

/// Canonical form of a listing URL: no query string, no fragment.
pub fn normalize_listing_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

/// Pull listing links out of one search results document.
pub fn parse_listing_links(html: &str, base: &Url) -> Result<Vec<String>, ScraperError> {
    let document = Html::parse_document(html);
    let cards = Selector::parse(CARD_SELECTOR).map_err(|e| ScraperError::Selector(e.to_string()))?;
    let link = Selector::parse(LINK_SELECTOR).map_err(|e| ScraperError::Selector(e.to_string()))?;

    let mut urls = Vec::new();
    for card in document.select(&cards) {
        let Some(href) = card
            .select(&link)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };

        match base.join(href) {
            Ok(abs) => {
                let normalized = normalize_listing_url(&abs);
                if !urls.contains(&normalized) {
                    urls.push(normalized);
                }
            }
            Err(e) => tracing::debug!(href, error = %e, "skipping unparseable listing link"),
        }
    }

    Ok(urls)
}

/// Walk up to `max_pages` search pages and collect unique listing URLs in
/// the order they were first seen.
///
/// Stops early on a page with no cards or no new links. A failure on the
/// first page is returned; later failures end pagination with what was found.
pub fn collect_listing_urls(
    fetcher: &dyn PageFetcher,
    search_url: &str,
    max_pages: u32,
) -> Result<SearchResult, ScraperError> {
    let base = Url::parse(search_url)?;

    let mut result = SearchResult::default();
    let mut seen = HashSet::new();

    for page in 1..=max_pages {
        let url = page_url(&base, page);
        tracing::info!(page, url = %url, "📄 Fetching search page");

        let html = match fetcher.fetch(url.as_str()) {
            Ok(html) => html,
            Err(e) if page == 1 => return Err(e),
            Err(e) => {
                tracing::warn!(page, error = %e, "search page failed, stopping pagination");
                break;
            }
        };
        result.pages_fetched += 1;

        let links = parse_listing_links(&html, &base)?;
        tracing::info!(page, cards = links.len(), "found property cards");

        let before = result.listing_urls.len();
        for link in links {
            if seen.insert(link.clone()) {
                result.listing_urls.push(link);
            }
        }

        if result.listing_urls.len() == before {
            tracing::info!(page, "🏁 No new listings, stopping");
            break;
        }
    }

    tracing::info!(total = result.listing_urls.len(), "✅ Listing URLs collected");
    Ok(result)
}
