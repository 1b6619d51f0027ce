mod extract;
mod fetch;
mod scraper_error;
mod search;

pub use extract::{extract_listing, external_id_for};
pub use fetch::{HttpFetcher, PageFetcher};
pub use scraper_error::ScraperError;
pub use search::{collect_listing_urls, page_url, SearchResult};
