use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One row of the `scrape_jobs` table.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeJob {
    pub id: i64,
    pub search_url: String,
    pub max_pages: i64,
    pub status: JobStatus,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub pages_fetched: i64,
    pub urls_found: i64,
    pub properties_created: i64,
    pub properties_updated: i64,
    pub properties_failed: i64,
    pub error_message: Option<String>,
}

/// Counters reported by a finished scrape run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub pages_fetched: usize,
    pub urls_found: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl JobSummary {
    pub fn processed(&self) -> usize {
        self.created + self.updated
    }
}
