use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SEARCH_URL: &str = "https://www.rightmove.co.uk/property-for-sale/find.html?searchLocation=London&useLocationIdentifier=true&locationIdentifier=REGION%5E87490&_includeSSTC=on&index=0&sortType=2&channel=BUY&transactionType=BUY&displayLocationIdentifier=London-87490.html&radius=40.0";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

pub const MAX_PAGES_LIMIT: u32 = 50;

pub const ZENROWS_ENDPOINT: &str = "https://api.zenrows.com/v1/";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: String,
    pub bind_addr: SocketAddr,
    pub max_workers: usize,
    pub scraper: ScraperSettings,
    pub default_search_url: String,
    pub default_max_pages: u32,
}

/// Knobs for the page fetcher and the scrape loop.
#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Pause between listing page fetches.
    pub request_delay: Duration,
    /// Route requests through ZenRows when set.
    pub zenrows_api_key: Option<String>,
    pub zenrows_endpoint: String,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            request_delay: Duration::from_millis(2000),
            zenrows_api_key: None,
            zenrows_endpoint: ZENROWS_ENDPOINT.to_string(),
        }
    }
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let default_max_pages: u32 = parse_var("DEFAULT_MAX_PAGES", 5)?;
        if !(1..=MAX_PAGES_LIMIT).contains(&default_max_pages) {
            anyhow::bail!("DEFAULT_MAX_PAGES must be between 1 and {MAX_PAGES_LIMIT}");
        }

        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "listings.sqlite3".to_string()),
            bind_addr: parse_var("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            max_workers: parse_var("MAX_WORKERS", 8)?,
            scraper: ScraperSettings {
                user_agent: env::var("SCRAPER_USER_AGENT")
                    .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
                timeout: Duration::from_secs(parse_var("SCRAPER_TIMEOUT_SECS", 30)?),
                max_attempts: parse_var::<u32>("SCRAPER_MAX_ATTEMPTS", 3)?.max(1),
                request_delay: Duration::from_millis(parse_var("SCRAPER_DELAY_MS", 2000)?),
                zenrows_api_key: env::var("ZENROWS_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty()),
                zenrows_endpoint: env::var("ZENROWS_ENDPOINT")
                    .unwrap_or_else(|_| ZENROWS_ENDPOINT.to_string()),
            },
            default_search_url: env::var("DEFAULT_SEARCH_URL")
                .unwrap_or_else(|_| DEFAULT_SEARCH_URL.to_string()),
            default_max_pages,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid value, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
