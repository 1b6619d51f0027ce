use crate::db::now_timestamp;
use crate::domain::{JobStatus, JobSummary, ScrapeJob};
use crate::errors::ServerError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::Serialize;

const JOB_COLUMNS: &str = "id, search_url, max_pages, status, created_at, started_at, finished_at, \
     pages_fetched, urls_found, properties_created, properties_updated, properties_failed, error_message";

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        JobStatus::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown job status {s:?}").into()))
    }
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

pub fn enqueue_job(conn: &Connection, search_url: &str, max_pages: u32) -> Result<i64, ServerError> {
    conn.execute(
        "INSERT INTO scrape_jobs (search_url, max_pages, status, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![search_url, max_pages, JobStatus::Pending, now_timestamp()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Move a pending job to running. Returns `None` when the job is missing or
/// was already claimed.
pub fn claim_job(conn: &Connection, job_id: i64) -> Result<Option<ScrapeJob>, ServerError> {
    let updated = conn.execute(
        "UPDATE scrape_jobs SET status = ?1, started_at = ?2 WHERE id = ?3 AND status = ?4",
        params![JobStatus::Running, now_timestamp(), job_id, JobStatus::Pending],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    get_job(conn, job_id)
}

pub fn finish_job(
    conn: &Connection,
    job_id: i64,
    summary: &JobSummary,
    error: Option<&str>,
) -> Result<(), ServerError> {
    let status = if error.is_some() {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    };

    conn.execute(
        "UPDATE scrape_jobs SET status = ?1, finished_at = ?2, pages_fetched = ?3, urls_found = ?4,
             properties_created = ?5, properties_updated = ?6, properties_failed = ?7, error_message = ?8
         WHERE id = ?9",
        params![
            status,
            now_timestamp(),
            summary.pages_fetched as i64,
            summary.urls_found as i64,
            summary.created as i64,
            summary.updated as i64,
            summary.failed as i64,
            error,
            job_id,
        ],
    )?;
    Ok(())
}

fn job_from_row(row: &Row) -> rusqlite::Result<ScrapeJob> {
    Ok(ScrapeJob {
        id: row.get(0)?,
        search_url: row.get(1)?,
        max_pages: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        started_at: row.get(5)?,
        finished_at: row.get(6)?,
        pages_fetched: row.get(7)?,
        urls_found: row.get(8)?,
        properties_created: row.get(9)?,
        properties_updated: row.get(10)?,
        properties_failed: row.get(11)?,
        error_message: row.get(12)?,
    })
}

pub fn get_job(conn: &Connection, job_id: i64) -> Result<Option<ScrapeJob>, ServerError> {
    Ok(conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM scrape_jobs WHERE id = ?1"),
            params![job_id],
            job_from_row,
        )
        .optional()?)
}

pub fn recent_jobs(conn: &Connection, limit: u32) -> Result<Vec<ScrapeJob>, ServerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM scrape_jobs ORDER BY id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], job_from_row)?;

    let mut jobs = Vec::new();
    for r in rows {
        jobs.push(r?);
    }
    Ok(jobs)
}

pub fn job_counts(conn: &Connection) -> Result<JobCounts, ServerError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM scrape_jobs GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, JobStatus>(0)?, row.get::<_, i64>(1)?)))?;

    let mut counts = JobCounts::default();
    for r in rows {
        let (status, n) = r?;
        match status {
            JobStatus::Pending => counts.pending = n,
            JobStatus::Running => counts.running = n,
            JobStatus::Completed => counts.completed = n,
            JobStatus::Failed => counts.failed = n,
        }
    }
    Ok(counts)
}

/// Pending jobs, oldest first.
pub fn pending_job_ids(conn: &Connection) -> Result<Vec<i64>, ServerError> {
    let mut stmt = conn.prepare("SELECT id FROM scrape_jobs WHERE status = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![JobStatus::Pending], |row| row.get(0))?;

    let mut ids = Vec::new();
    for r in rows {
        ids.push(r?);
    }
    Ok(ids)
}

/// Jobs left `running` by a previous process can never finish; close them out.
pub fn fail_interrupted_jobs(conn: &Connection) -> Result<usize, ServerError> {
    Ok(conn.execute(
        "UPDATE scrape_jobs SET status = ?1, finished_at = ?2, error_message = 'interrupted by shutdown'
         WHERE status = ?3",
        params![JobStatus::Failed, now_timestamp(), JobStatus::Running],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::utils::init_test_db;

    #[test]
    fn job_lifecycle_is_recorded() {
        let db = init_test_db();
        db.with_conn(|conn| {
            let id = enqueue_job(conn, "https://www.rightmove.co.uk/find.html", 3)?;
            assert_eq!(get_job(conn, id)?.unwrap().status, JobStatus::Pending);

            let claimed = claim_job(conn, id)?.unwrap();
            assert_eq!(claimed.status, JobStatus::Running);
            assert!(claimed.started_at.is_some());
            assert!(claim_job(conn, id)?.is_none(), "a job is claimed once");

            let summary = JobSummary {
                pages_fetched: 2,
                urls_found: 30,
                created: 25,
                updated: 3,
                failed: 2,
            };
            finish_job(conn, id, &summary, None)?;

            let done = get_job(conn, id)?.unwrap();
            assert_eq!(done.status, JobStatus::Completed);
            assert_eq!(done.properties_created, 25);
            assert_eq!(done.properties_failed, 2);
            assert!(done.finished_at.is_some());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn counts_pending_and_interrupted_jobs() {
        let db = init_test_db();
        db.with_conn(|conn| {
            let a = enqueue_job(conn, "https://a.example/", 1)?;
            let b = enqueue_job(conn, "https://b.example/", 1)?;
            let c = enqueue_job(conn, "https://c.example/", 1)?;
            claim_job(conn, a)?;
            finish_job(conn, c, &JobSummary::default(), Some("boom"))?;

            assert_eq!(pending_job_ids(conn)?, vec![b]);
            assert_eq!(
                job_counts(conn)?,
                JobCounts { pending: 1, running: 1, completed: 0, failed: 1 }
            );

            assert_eq!(fail_interrupted_jobs(conn)?, 1);
            let interrupted = get_job(conn, a)?.unwrap();
            assert_eq!(interrupted.status, JobStatus::Failed);
            assert_eq!(interrupted.error_message.as_deref(), Some("interrupted by shutdown"));

            assert_eq!(recent_jobs(conn, 2)?.iter().map(|j| j.id).collect::<Vec<_>>(), vec![c, b]);
            Ok(())
        })
        .unwrap();
    }
}
