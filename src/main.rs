use crate::config::{Settings, MAX_PAGES_LIMIT};
use crate::db::{init_db, Database};
use crate::router::{handle, is_api_path, AppState};
use crate::scraper::{HttpFetcher, PageFetcher};
use crate::worker::{run_scrape_job, JobQueue};
use anyhow::{Context, Result};
use astra::{Request, ConnectionInfo, Server};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod domain;
mod errors;
mod responses;
mod router;
mod scraper;
mod templates;
mod worker;

#[cfg(test)]
mod tests;

#[derive(Parser)]
#[command(name = "listing_scraper", about = "Scrape property listings into SQLite and serve them over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API together with the background scrape worker (default)
    Serve,
    /// Scrape a search URL right now, without going through the server
    Scrape {
        /// Search results URL; defaults to DEFAULT_SEARCH_URL
        #[arg(long)]
        url: Option<String>,
        /// Number of search result pages to walk
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_PAGES_LIMIT as i64))]
        max_pages: Option<u32>,
    },
    /// Create the database schema and exit
    InitDb,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,listing_scraper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    init_tracing();

    let db = Database::new(settings.database_path.clone());
    init_db(&db).context("database initialization failed")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db, settings),
        Command::Scrape { url, max_pages } => scrape_now(db, settings, url, max_pages),
        Command::InitDb => Ok(()),
    }
}

fn serve(db: Database, settings: Settings) -> Result<()> {
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(&settings.scraper)?);
    let (queue, _worker) = JobQueue::start(db.clone(), fetcher, settings.scraper.clone())?;

    let state = AppState {
        db,
        queue,
        default_search_url: settings.default_search_url.clone(),
        default_max_pages: settings.default_max_pages,
    };

    tracing::info!(addr = %settings.bind_addr, "Starting server at http://{}", settings.bind_addr);

    let server = Server::bind(&settings.bind_addr).max_workers(settings.max_workers);

    // Serve requests, passing app state into closure
    server
        .serve(move |req: Request, _info: ConnectionInfo| {
            let as_json = is_api_path(req.uri().path());
            match handle(req, &state) {
                Ok(resp) => resp,
                Err(err) => responses::error_response(err, as_json),
            }
        })
        .context("server ended with error")?;

    tracing::info!("Server shut down cleanly.");
    Ok(())
}

fn scrape_now(db: Database, settings: Settings, url: Option<String>, max_pages: Option<u32>) -> Result<()> {
    let search_url = url.unwrap_or_else(|| settings.default_search_url.clone());
    url::Url::parse(&search_url).with_context(|| format!("invalid search URL {search_url:?}"))?;
    let max_pages = max_pages.unwrap_or(settings.default_max_pages);

    let fetcher = HttpFetcher::new(&settings.scraper)?;
    let job_id = db.with_conn(|conn| db::jobs::enqueue_job(conn, &search_url, max_pages))?;

    let summary = run_scrape_job(&db, &fetcher, &settings.scraper, job_id)?.unwrap_or_default();

    println!(
        "Scraped {} properties ({} new, {} updated, {} failed) from {} page(s)",
        summary.processed(),
        summary.created,
        summary.updated,
        summary.failed,
        summary.pages_fetched,
    );
    Ok(())
}
