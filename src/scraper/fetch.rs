// fetch.rs
use crate::config::ScraperSettings;
use crate::scraper::ScraperError;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use std::time::{Duration, Instant};

const MAX_BACKOFF_SECS: u64 = 10;
const JITTER_MAX_MILLIS: u64 = 2000;

/// Anything that can turn a URL into an HTML document.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, ScraperError>;
}

pub struct HttpFetcher {
    client: Client,
    max_attempts: u32,
    zenrows_api_key: Option<String>,
    zenrows_endpoint: String,
}

impl HttpFetcher {
    pub fn new(settings: &ScraperSettings) -> Result<Self, ScraperError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            max_attempts: settings.max_attempts.max(1),
            zenrows_api_key: settings.zenrows_api_key.clone(),
            zenrows_endpoint: settings.zenrows_endpoint.clone(),
        })
    }

    fn try_fetch(&self, url: &str) -> Result<String, ScraperError> {
        match &self.zenrows_api_key {
            Some(api_key) => self.try_fetch_via_zenrows(url, api_key),
            None => self.try_fetch_direct(url),
        }
    }

    fn try_fetch_direct(&self, url: &str) -> Result<String, ScraperError> {
        let resp = self.client.get(url).send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(resp.text()?)
    }

    fn try_fetch_via_zenrows(&self, url: &str, api_key: &str) -> Result<String, ScraperError> {
        let params = [
            ("url", url),
            ("apikey", api_key),
            ("original_status", "true"),
            ("mode", "auto"),
        ];

        let resp = self.client.get(self.zenrows_endpoint.as_str()).query(&params).send()?;

        let status = resp.status();
        let original_status = resp
            .headers()
            .iter()
            .find(|(k, _)| k.as_str().contains("original"))
            .and_then(|(_, v)| v.to_str().ok())
            .unwrap_or("<none>")
            .to_string();

        let text = resp.text()?;

        if !status.is_success() {
            return Err(ScraperError::Proxy(format!(
                "ZenRows HTTP {status} ({original_status}) : {text}"
            )));
        }

        match zenrows_error(&text, &original_status) {
            Some(err) => Err(err),
            None => Ok(text),
        }
    }
}

/// ZenRows reports its own failures as a 200 with a JSON body carrying `code`.
fn zenrows_error(body: &str, original_status: &str) -> Option<ScraperError> {
    if !body.trim_start().starts_with('{') {
        return None;
    }
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("code").map(|_| {
        ScraperError::Proxy(format!("ZenRows API error ({original_status}) : {body}"))
    })
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, ScraperError> {
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            let start = Instant::now();

            match self.try_fetch(url) {
                Ok(html) => {
                    tracing::debug!(url, attempt, elapsed = ?start.elapsed(), "fetched page");
                    return Ok(html);
                }
                Err(e) => {
                    tracing::warn!(
                        url,
                        attempt,
                        elapsed = ?start.elapsed(),
                        error = %e,
                        "⚠️ fetch attempt failed"
                    );
                    last_err = Some(e);

                    if attempt < self.max_attempts {
                        std::thread::sleep(backoff(attempt));
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ScraperError::Network("retry loop exhausted".into())))
    }
}

/// Linear backoff capped at ten seconds, plus up to two seconds of jitter.
fn backoff(attempt: u32) -> Duration {
    let base = std::cmp::min(2 * attempt as u64, MAX_BACKOFF_SECS);
    let jitter = rand::thread_rng().gen_range(0..=JITTER_MAX_MILLIS);
    Duration::from_secs(base) + Duration::from_millis(jitter)
}
