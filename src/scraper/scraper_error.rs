use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Proxy error: {0}")]
    Proxy(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Selector error: {0}")]
    Selector(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ScraperError {
    fn from(e: reqwest::Error) -> Self {
        ScraperError::Network(e.to_string())
    }
}

impl From<url::ParseError> for ScraperError {
    fn from(e: url::ParseError) -> Self {
        ScraperError::InvalidUrl(e.to_string())
    }
}

impl From<crate::errors::ServerError> for ScraperError {
    fn from(e: crate::errors::ServerError) -> Self {
        ScraperError::Storage(e.to_string())
    }
}
