pub mod job;
pub mod listing;

pub use job::{JobStatus, JobSummary, ScrapeJob};
pub use listing::{SaveOutcome, ScrapedListing, ScrapingStatus, StoredImage, StoredListing};
