// worker.rs
use crate::config::ScraperSettings;
use crate::db::jobs::{claim_job, enqueue_job, fail_interrupted_jobs, finish_job, pending_job_ids};
use crate::db::listings::{mark_listing_failed, save_listing};
use crate::db::Database;
use crate::domain::{JobSummary, SaveOutcome};
use crate::errors::ServerError;
use crate::scraper::{collect_listing_urls, extract_listing, PageFetcher, ScraperError};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Persistent queue of scrape jobs drained by a single background thread.
///
/// Jobs live in `scrape_jobs`; the channel only carries ids so the worker
/// wakes up. Jobs run strictly one at a time, oldest first.
pub struct JobQueue {
    db: Database,
    sender: Mutex<Sender<i64>>,
}

impl JobQueue {
    /// Spawn the worker thread and re-queue anything left pending by a
    /// previous process.
    pub fn start(
        db: Database,
        fetcher: Arc<dyn PageFetcher>,
        settings: ScraperSettings,
    ) -> Result<(Self, JoinHandle<()>), ServerError> {
        let (interrupted, pending) = db.with_conn(|conn| {
            let interrupted = fail_interrupted_jobs(conn)?;
            Ok((interrupted, pending_job_ids(conn)?))
        })?;
        if interrupted > 0 {
            tracing::warn!(interrupted, "marked interrupted jobs as failed");
        }

        let (sender, receiver) = mpsc::channel();
        let worker_db = db.clone();
        let handle = std::thread::Builder::new()
            .name("scrape-worker".into())
            .spawn(move || worker_loop(worker_db, fetcher, settings, receiver))
            .map_err(|e| ServerError::QueueError(format!("failed to spawn worker: {e}")))?;

        for job_id in pending {
            tracing::info!(job_id, "re-queueing pending job");
            sender
                .send(job_id)
                .map_err(|_| ServerError::QueueError("worker is not running".into()))?;
        }

        Ok((
            Self {
                db,
                sender: Mutex::new(sender),
            },
            handle,
        ))
    }

    /// Record a new job and hand it to the worker. Returns the job id.
    pub fn enqueue(&self, search_url: &str, max_pages: u32) -> Result<i64, ServerError> {
        let job_id = self
            .db
            .with_conn(|conn| enqueue_job(conn, search_url, max_pages))?;

        self.sender
            .lock()
            .map_err(|_| ServerError::QueueError("queue lock poisoned".into()))?
            .send(job_id)
            .map_err(|_| ServerError::QueueError("worker is not running".into()))?;

        tracing::info!(job_id, search_url, max_pages, "📥 scrape job queued");
        Ok(job_id)
    }
}

fn worker_loop(
    db: Database,
    fetcher: Arc<dyn PageFetcher>,
    settings: ScraperSettings,
    receiver: Receiver<i64>,
) {
    tracing::info!("🧵 scrape worker started");

    for job_id in receiver {
        if let Err(e) = run_scrape_job(&db, fetcher.as_ref(), &settings, job_id) {
            tracing::error!(job_id, error = %e, "scrape job crashed");
        }
    }

    tracing::info!("scrape worker stopped");
}

/// Run one job end to end: collect listing URLs, scrape each listing page,
/// store the results and close out the job row.
///
/// A listing that fails to fetch is recorded as failed and the run goes on.
/// Returns `Ok(None)` if the job was missing or already claimed.
pub fn run_scrape_job(
    db: &Database,
    fetcher: &dyn PageFetcher,
    settings: &ScraperSettings,
    job_id: i64,
) -> Result<Option<JobSummary>, ServerError> {
    let Some(job) = db.with_conn(|conn| claim_job(conn, job_id))? else {
        tracing::warn!(job_id, "job not pending, skipping");
        return Ok(None);
    };

    let span = tracing::info_span!("scrape_job", job_id, search_url = %job.search_url);
    let _guard = span.enter();
    tracing::info!(max_pages = job.max_pages, "🚀 starting scrape");

    let mut summary = JobSummary::default();
    let max_pages = u32::try_from(job.max_pages).unwrap_or(1);

    let search = match collect_listing_urls(fetcher, &job.search_url, max_pages) {
        Ok(search) => search,
        Err(e) => {
            tracing::error!(error = %e, "❌ could not read search results");
            let message = e.to_string();
            db.with_conn(|conn| finish_job(conn, job_id, &summary, Some(message.as_str())))?;
            return Ok(Some(summary));
        }
    };
    summary.pages_fetched = search.pages_fetched;
    summary.urls_found = search.listing_urls.len();

    let total = search.listing_urls.len();
    for (i, url) in search.listing_urls.iter().enumerate() {
        tracing::info!(n = i + 1, total, url = %url, "🏠 scraping listing");

        match scrape_one(db, fetcher, url) {
            Ok(SaveOutcome::Created) => summary.created += 1,
            Ok(SaveOutcome::Updated) => summary.updated += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(url = %url, error = %e, "listing failed");
                if let Err(db_err) = mark_listing_failed(db, url, &e.to_string()) {
                    tracing::error!(url = %url, error = %db_err, "could not record listing failure");
                }
            }
        }

        if i + 1 < total && !settings.request_delay.is_zero() {
            std::thread::sleep(settings.request_delay);
        }
    }

    db.with_conn(|conn| finish_job(conn, job_id, &summary, None))?;

    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        failed = summary.failed,
        processed = summary.processed(),
        "🎉 scrape complete"
    );
    Ok(Some(summary))
}

fn scrape_one(db: &Database, fetcher: &dyn PageFetcher, url: &str) -> Result<SaveOutcome, ScraperError> {
    let html = fetcher.fetch(url)?;
    let listing = extract_listing(&html, url);
    Ok(save_listing(db, &listing)?)
}
