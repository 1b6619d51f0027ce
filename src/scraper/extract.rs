//! Field extraction for a single listing detail page.
//!
//! Every field is best-effort: a missing node leaves the field empty and the
//! rest of the page is still read.

use crate::domain::ScrapedListing;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Prices below this are treated as noise (deposits, fees, per-month figures).
const MIN_PLAUSIBLE_PRICE: f64 = 10_000.0;

const PRICE_SELECTORS: &[&str] = &[
    "span._1gfnqJ3Vtd1z40MlC0MzXu span",
    "span[data-testid='price']",
    "div[data-testid='price'] span",
    "span[class*='propertyCard-priceValue']",
    "p[class*='price']",
    "div[class*='price'] span",
    "span.propertyCard-priceValue",
    "article span[class*='price']",
];

const IMAGE_SELECTORS: &[&str] = &[
    "img[src*='rightmove']",
    "img[src*='media']",
    "div[class*='gallery'] img",
    "img",
];

const DESCRIPTION_STOP_HEADINGS: &[&str] = &[
    "key features",
    "brochures",
    "council tax",
    "notes",
    "staying secure",
    "map",
    "nearest stations",
    "schools",
    "broadband",
    "property type",
    "bedrooms",
    "bathrooms",
    "size",
    "tenure",
    "features",
];

const FEATURE_STOP_HEADINGS: &[&str] = &[
    "description",
    "brochures",
    "council tax",
    "notes",
    "property type",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "section", "table", "td", "th", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

fn listing_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/properties/(\d+)").expect("static regex"))
}

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"£\s*[\d,]+(?:\.\d{2})?").expect("static regex"))
}

fn first_int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").expect("static regex"))
}

fn date_added_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:Added on|Reduced on)\s+(\d{2}/\d{2}/\d{4})").expect("static regex")
    })
}

/// Read every field we know about out of one listing page.
pub fn extract_listing(html: &str, listing_url: &str) -> ScrapedListing {
    let document = Html::parse_document(html);
    let lines = page_lines(&document);
    let page_text = lines.join("\n");

    let (price, price_numeric) = extract_price(&document, &page_text).unwrap_or_default();
    let details = extract_details(&document);

    let listing = ScrapedListing {
        external_id: external_id_for(listing_url),
        listing_url: listing_url.to_string(),
        title: extract_title(&document),
        price,
        price_numeric,
        property_type: details.property_type,
        bedrooms: details.bedrooms,
        bathrooms: details.bathrooms,
        size: details.size,
        description: extract_description(&lines),
        key_features: extract_key_features(&lines),
        date_added: extract_date_added(&page_text),
        image_urls: extract_images(&document),
    };

    tracing::debug!(
        url = listing_url,
        title = %listing.title,
        price = %listing.price,
        price_numeric = ?listing.price_numeric,
        bedrooms = ?listing.bedrooms,
        property_type = %listing.property_type,
        description_chars = listing.description.len(),
        key_features = listing.key_features.len(),
        images = listing.image_urls.len(),
        "extraction summary"
    );

    listing
}

/// Numeric id from `/properties/<digits>`, otherwise the SHA-256 of the URL.
pub fn external_id_for(listing_url: &str) -> String {
    if let Some(caps) = listing_id_re().captures(listing_url) {
        return caps[1].to_string();
    }

    let digest = Sha256::digest(listing_url.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// "£550,000" -> 550000.0. Anything but digits and dots is ignored.
pub fn parse_price_numeric(price: &str) -> Option<f64> {
    let digits: String = price
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(e) => {
            tracing::warn!(css, error = ?e, "invalid selector");
            Vec::new()
        }
    }
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn extract_title(document: &Html) -> String {
    ["h1[itemprop='streetAddress']", "h1"]
        .iter()
        .find_map(|css| {
            select(document, css)
                .first()
                .map(element_text)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

fn extract_price(document: &Html, page_text: &str) -> Option<(String, Option<f64>)> {
    // Dedicated price nodes.
    for css in PRICE_SELECTORS {
        for el in select(document, css) {
            let text = element_text(&el);
            if text.contains('£') && text.chars().count() > 2 {
                tracing::debug!(selector = css, price = %text, "price from selector");
                let numeric = parse_price_numeric(&text);
                return Some((text, numeric));
            }
        }
    }

    // Largest plausible £ amount anywhere on the page.
    let best = price_re()
        .find_iter(page_text)
        .filter_map(|m| {
            let value = parse_price_numeric(m.as_str())?;
            (value > MIN_PLAUSIBLE_PRICE).then(|| (m.as_str().to_string(), value))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((text, value)) = best {
        tracing::debug!(price = %text, "price from page text");
        return Some((text, Some(value)));
    }

    // Short elements whose own text carries a £ sign.
    for tag in ["span", "p", "div"] {
        for el in select(document, tag) {
            let own_text_has_pound = el
                .children()
                .filter_map(|child| child.value().as_text())
                .any(|t| t.contains('£'));
            if !own_text_has_pound {
                continue;
            }

            let text = element_text(&el);
            if text.chars().count() >= 30 {
                continue;
            }
            if let Some(value) = parse_price_numeric(&text).filter(|v| *v > MIN_PLAUSIBLE_PRICE) {
                return Some((text, Some(value)));
            }
        }
    }

    // Open Graph price.
    let meta = select(document, "meta[property='og:price:amount']");
    if let Some(content) = meta.first().and_then(|m| m.value().attr("content")) {
        let content = content.trim();
        if let Ok(value) = content.parse::<f64>() {
            return Some((format!("£{content}"), Some(value)));
        }
    }

    tracing::warn!("⚠️ Price not found");
    None
}

#[derive(Debug, Default)]
struct Details {
    property_type: String,
    bedrooms: Option<i64>,
    bathrooms: Option<i64>,
    size: String,
}

fn first_int(text: &str) -> Option<i64> {
    first_int_re()
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// `<dt>LABEL</dt><dd>value</dd>` pairs.
fn extract_details(document: &Html) -> Details {
    let mut details = Details::default();

    for dt in select(document, "dt") {
        let label = element_text(&dt).to_uppercase();

        let Some(dd) = dt
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "dd")
        else {
            continue;
        };
        let value = element_text(&dd);

        if label.contains("PROPERTY TYPE") || label == "TYPE" {
            details.property_type = value;
        } else if label.contains("BEDROOM") {
            if let Some(n) = first_int(&value) {
                details.bedrooms = Some(n);
            }
        } else if label.contains("BATHROOM") {
            if let Some(n) = first_int(&value) {
                details.bathrooms = Some(n);
            }
        } else if label.contains("SIZE") || label.contains("FLOOR AREA") {
            let lower = value.to_lowercase();
            if ["sq ft", "sq m", "sqft", "sqm"].iter().any(|u| lower.contains(u)) {
                details.size = value;
            }
        }
    }

    details
}

/// Visible text of `<body>`, one trimmed non-empty line per block.
pub fn page_lines(document: &Html) -> Vec<String> {
    let mut buf = String::new();
    let roots = select(document, "body");
    match roots.first() {
        Some(body) => collect_text(*body, &mut buf),
        None => collect_text(document.root_element(), &mut buf),
    }

    buf.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect()
}

fn collect_text(el: ElementRef, buf: &mut String) {
    let name = el.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }

    let block = BLOCK_TAGS.contains(&name);
    if block {
        buf.push('\n');
    }

    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            collect_text(child_el, buf);
        } else if let Some(text) = child.value().as_text() {
            buf.push_str(&text.replace('\n', " "));
        }
    }

    if block {
        buf.push('\n');
    }
}

fn section_start(lines: &[String], is_heading: impl Fn(&str) -> bool) -> Option<usize> {
    lines
        .iter()
        .position(|l| is_heading(&l.trim().to_lowercase()))
        .map(|i| i + 1)
}

fn extract_description(lines: &[String]) -> String {
    let Some(start) = section_start(lines, |l| l == "description" || l == "property description")
    else {
        return String::new();
    };

    let mut kept = Vec::new();
    for line in &lines[start..] {
        let line = line.trim();
        let lower = line.to_lowercase();
        if DESCRIPTION_STOP_HEADINGS.iter().any(|h| lower.contains(h)) {
            break;
        }
        if line.chars().count() > 15 {
            kept.push(line);
        }
    }

    kept.join(" ")
}

fn is_all_caps(s: &str) -> bool {
    s.chars().any(|c| c.is_alphabetic()) && !s.chars().any(|c| c.is_lowercase())
}

fn extract_key_features(lines: &[String]) -> Vec<String> {
    let Some(start) = section_start(lines, |l| l.contains("key features") || l == "features")
    else {
        return Vec::new();
    };

    let mut features = Vec::new();
    for line in &lines[start..] {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();
        if FEATURE_STOP_HEADINGS.iter().any(|h| lower.contains(h)) {
            break;
        }

        let len = line.chars().count();
        if len > 5 && len < 150 && !is_all_caps(line) && !line.contains(':') {
            features.push(line.to_string());
        }
    }

    features
}

fn extract_date_added(page_text: &str) -> Option<NaiveDate> {
    date_added_re()
        .captures_iter(page_text)
        .find_map(|caps| NaiveDate::parse_from_str(&caps[1], "%d/%m/%Y").ok())
}

fn extract_images(document: &Html) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();

    for meta in select(document, "meta[property='og:image']") {
        if let Some(src) = meta.value().attr("content") {
            if src.starts_with("http") && !urls.iter().any(|u| u == src) {
                urls.push(src.to_string());
            }
        }
    }

    for css in IMAGE_SELECTORS {
        for img in select(document, css) {
            let src = img
                .value()
                .attr("src")
                .filter(|s| !s.is_empty())
                .or_else(|| img.value().attr("data-src"));
            let Some(src) = src else { continue };

            let lower = src.to_lowercase();
            let relevant = ["rightmove", "media", "property"]
                .iter()
                .any(|k| lower.contains(k));
            if src.starts_with("http") && relevant && !urls.iter().any(|u| u == src) {
                urls.push(src.to_string());
            }
        }
    }

    urls
}
