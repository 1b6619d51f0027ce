pub mod connection;
pub mod jobs;
pub mod listings;

pub use connection::{init_db, Database};

use chrono::{SecondsFormat, Utc};

/// RFC 3339 UTC with fixed precision, so text ordering matches time ordering.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
