use crate::config::ScraperSettings;
use crate::db::{init_db, Database};
use crate::router::AppState;
use crate::scraper::{page_url, PageFetcher, ScraperError};
use crate::worker::JobQueue;
use astra::Response;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use url::Url;

pub const SEARCH_URL: &str =
    "https://www.rightmove.co.uk/property-for-sale/find.html?locationIdentifier=REGION%5E87490";

pub const SEARCH_PAGE: &str = include_str!("fixtures/search_page.html");
pub const LISTING_111: &str = include_str!("fixtures/listing_111.html");
pub const LISTING_222: &str = include_str!("fixtures/listing_222.html");

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh database file with the production schema applied.
pub fn init_test_db() -> Database {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!("listing_scraper_test_{nanos}_{n}.sqlite"));

    let db = Database::new(path.to_string_lossy().into_owned());
    init_db(&db).unwrap_or_else(|e| panic!("Database initialization failed: {e}"));
    db
}

/// Serves canned HTML by exact URL; anything else is a 404.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    pub requested: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn with_page(mut self, url: impl Into<String>, html: &str) -> Self {
        self.pages.insert(url.into(), html.to_string());
        self
    }

    /// Search page one plus both listing fixtures. Listing 333 is left out
    /// so that it fails.
    pub fn rightmove() -> Self {
        Self::default()
            .with_page(search_page_url(1), SEARCH_PAGE)
            .with_page("https://www.rightmove.co.uk/properties/111", LISTING_111)
            .with_page("https://www.rightmove.co.uk/properties/222", LISTING_222)
    }
}

impl PageFetcher for FixtureFetcher {
    fn fetch(&self, url: &str) -> Result<String, ScraperError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScraperError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

pub fn search_page_url(page: u32) -> String {
    page_url(&Url::parse(SEARCH_URL).unwrap(), page).to_string()
}

pub fn test_settings() -> ScraperSettings {
    ScraperSettings {
        request_delay: Duration::ZERO,
        max_attempts: 1,
        ..Default::default()
    }
}

/// App state backed by a fresh database and a worker that reads fixtures.
pub fn test_state(fetcher: FixtureFetcher) -> AppState {
    let db = init_test_db();
    let (queue, _worker) = JobQueue::start(db.clone(), Arc::new(fetcher), test_settings())
        .expect("worker should start");

    AppState {
        db,
        queue,
        default_search_url: SEARCH_URL.to_string(),
        default_max_pages: 3,
    }
}

pub fn body_string(resp: Response) -> String {
    let mut body = String::new();
    resp.into_body()
        .reader()
        .read_to_string(&mut body)
        .expect("response body should be utf-8");
    body
}

pub fn body_json(resp: Response) -> serde_json::Value {
    serde_json::from_str(&body_string(resp)).expect("response body should be JSON")
}

/// Poll until the job reaches a finished state or the timeout passes.
pub fn wait_for_job(db: &Database, job_id: i64) -> crate::domain::ScrapeJob {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let job = db
            .with_conn(|conn| crate::db::jobs::get_job(conn, job_id))
            .unwrap()
            .expect("job row should exist");
        if job.status.is_finished() {
            return job;
        }
        assert!(Instant::now() < deadline, "job {job_id} did not finish in time");
        std::thread::sleep(Duration::from_millis(20));
    }
}
