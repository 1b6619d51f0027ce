use crate::config::MAX_PAGES_LIMIT;
use crate::db::jobs::{get_job, job_counts, recent_jobs, JobCounts};
use crate::db::listings::{
    get_listing, list_listings, listing_stats, ListingQuery, ListingStats, DEFAULT_PAGE_SIZE,
};
use crate::errors::{ResultResp, ServerError};
use crate::responses::{html_response, json_response};
use crate::router::AppState;
use crate::domain::StoredListing;
use crate::templates::pages::{home_page, HomeVm};
use astra::Request;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::io::Read;
use url::Url;

const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
struct ScrapeRequest {
    search_url: Option<String>,
    max_pages: Option<serde_json::Number>,
}

/// A listing as the API returns it: the stored row plus derived image fields.
#[derive(Debug, Serialize)]
pub struct ListingView<'a> {
    #[serde(flatten)]
    listing: &'a StoredListing,
    image_urls: Vec<&'a str>,
    primary_image: Option<&'a str>,
    image_count: usize,
}

impl<'a> From<&'a StoredListing> for ListingView<'a> {
    fn from(listing: &'a StoredListing) -> Self {
        Self {
            listing,
            image_urls: listing.image_urls(),
            primary_image: listing.primary_image(),
            image_count: listing.image_count(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsView {
    #[serde(flatten)]
    listings: ListingStats,
    jobs: JobCounts,
}

pub fn parse_query(req: &Request) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn read_body(req: &mut Request) -> Result<Vec<u8>, ServerError> {
    let mut buf = Vec::new();
    req.body_mut()
        .reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut buf)
        .map_err(|e| ServerError::BadRequest(format!("could not read request body: {e}")))?;

    if buf.len() as u64 > MAX_BODY_BYTES {
        return Err(ServerError::BadRequest("request body too large".into()));
    }
    Ok(buf)
}

fn validate_search_url(raw: &str) -> Result<String, ServerError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ServerError::BadRequest(format!("invalid search_url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ServerError::BadRequest(
            "search_url must be an http(s) URL".into(),
        ));
    }
    Ok(url.to_string())
}

/// Accepts any JSON number with no fractional part, so `5` and `5.0` agree.
fn whole_pages(n: &serde_json::Number) -> Result<u32, ServerError> {
    let pages = n
        .as_f64()
        .filter(|f| f.fract() == 0.0)
        .ok_or_else(|| ServerError::BadRequest(format!("max_pages must be a whole number, got {n}")))?;

    if !(1.0..=MAX_PAGES_LIMIT as f64).contains(&pages) {
        return Err(ServerError::BadRequest(format!(
            "max_pages must be between 1 and {MAX_PAGES_LIMIT}"
        )));
    }
    Ok(pages as u32)
}

/// `POST /api/scrape/`: queue a scrape job.
pub fn trigger_scrape(mut req: Request, app: &AppState) -> ResultResp {
    let body = read_body(&mut req)?;
    let payload: ScrapeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ScrapeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))?
    };

    let search_url = validate_search_url(
        payload
            .search_url
            .as_deref()
            .unwrap_or(&app.default_search_url),
    )?;

    let max_pages = match &payload.max_pages {
        Some(n) => whole_pages(n)?,
        None => app.default_max_pages,
    };

    let task_id = app.queue.enqueue(&search_url, max_pages)?;

    json_response(
        200,
        &json!({
            "status": "success",
            "message": format!("Scraping started for {search_url}"),
            "task_id": task_id,
        }),
    )
}

fn parse_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ServerError> {
    match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ServerError::BadRequest(format!("invalid {key}: {raw:?}"))),
        None => Ok(None),
    }
}

/// `GET /api/properties/`: paginated listings, newest first.
pub fn list_properties(req: &Request, app: &AppState) -> ResultResp {
    let params = parse_query(req);

    let query = ListingQuery {
        page: parse_param(&params, "page")?.unwrap_or(1),
        page_size: parse_param(&params, "page_size")?.unwrap_or(DEFAULT_PAGE_SIZE),
        bedrooms: parse_param(&params, "bedrooms")?,
        property_type: params.get("property_type").cloned(),
        search: params.get("search").cloned(),
    };

    let page = list_listings(&app.db, &query)?;
    let results: Vec<ListingView> = page.results.iter().map(ListingView::from).collect();

    json_response(
        200,
        &json!({
            "count": page.count,
            "page": page.page,
            "page_size": page.page_size,
            "num_pages": page.num_pages,
            "results": results,
        }),
    )
}

/// `GET /api/properties/{id}/`
pub fn get_property(id: &str, app: &AppState) -> ResultResp {
    let id: i64 = id.parse().map_err(|_| ServerError::NotFound)?;
    let listing = get_listing(&app.db, id)?.ok_or(ServerError::NotFound)?;
    json_response(200, &ListingView::from(&listing))
}

/// `GET /api/stats/`
pub fn get_stats(app: &AppState) -> ResultResp {
    let listings = listing_stats(&app.db)?;
    let jobs = app.db.with_conn(|conn| job_counts(conn))?;
    json_response(200, &StatsView { listings, jobs })
}

/// `GET /api/jobs/{id}/`
pub fn get_job_status(id: &str, app: &AppState) -> ResultResp {
    let id: i64 = id.parse().map_err(|_| ServerError::NotFound)?;
    let job = app
        .db
        .with_conn(|conn| get_job(conn, id))?
        .ok_or(ServerError::NotFound)?;
    json_response(200, &job)
}

/// `GET /`: HTML overview.
pub fn home(app: &AppState) -> ResultResp {
    let stats = listing_stats(&app.db)?;
    let listings = list_listings(&app.db, &ListingQuery::default())?.results;
    let (job_counts, jobs) = app
        .db
        .with_conn(|conn| Ok((job_counts(conn)?, recent_jobs(conn, 10)?)))?;

    html_response(home_page(&HomeVm {
        stats,
        job_counts,
        listings,
        jobs,
    }))
}
