use crate::api;
use crate::db::Database;
use crate::errors::{ResultResp, ServerError};
use crate::worker::JobQueue;
use astra::Request;

/// Everything a request handler can reach.
pub struct AppState {
    pub db: Database,
    pub queue: JobQueue,
    pub default_search_url: String,
    pub default_max_pages: u32,
}

/// Whether errors on this path should be rendered as JSON.
pub fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

pub fn handle(req: Request, app: &AppState) -> ResultResp {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    tracing::debug!(%method, %path, "request");

    match (method.as_str(), segments.as_slice()) {
        ("GET", []) => api::home(app),

        ("POST", ["api", "scrape"]) => api::trigger_scrape(req, app),
        ("GET", ["api", "properties"]) => api::list_properties(&req, app),
        ("GET", ["api", "properties", id]) => api::get_property(id, app),
        ("GET", ["api", "stats"]) => api::get_stats(app),
        ("GET", ["api", "jobs", id]) => api::get_job_status(id, app),

        (_, [] | ["api", "scrape"] | ["api", "properties"] | ["api", "properties", _])
        | (_, ["api", "stats"] | ["api", "jobs", _]) => Err(ServerError::MethodNotAllowed),

        _ => Err(ServerError::NotFound),
    }
}
