//! Job repository: lifecycle operations for the `jobs` table.
//!
//! Status transitions are guarded here: a row in a terminal status
//! (`completed`, `failed`) never moves back to `pending` or `processing`,
//! and `retry_count` only ever increases.

use rusqlite::{params, OptionalExtension, Row};

use crate::job::JobStatus;

use super::{Database, DatabaseError};

/// Error messages are stored length-bounded; full diagnostics go to the
/// `job_logs` table.
const MAX_ERROR_LEN: usize = 500;

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub payload: String,
    pub status: String,
    pub retry_count: u32,
    pub worker_id: Option<u32>,
    pub error_message: Option<String>,
    pub has_photo: bool,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            payload: row.get("payload")?,
            status: row.get("status")?,
            retry_count: row.get("retry_count")?,
            worker_id: row.get("worker_id")?,
            error_message: row.get("error_message")?,
            has_photo: row.get("has_photo")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}

/// Counts per status for the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub last_24h: u64,
}

impl JobStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_LEN {
        return error.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_string()
}

/// Inserts a job row, or refreshes the payload of an existing one.
///
/// Idempotent: re-submitting an id that already exists keeps its status
/// and retry count, so a duplicate submission cannot resurrect a terminal
/// row or reset recovery accounting.
pub fn insert(
    db: &Database,
    id: &str,
    payload_json: &str,
    has_photo: bool,
) -> Result<(), DatabaseError> {
    let now = now_ts();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, payload, status, has_photo, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 payload = excluded.payload,
                 has_photo = excluded.has_photo,
                 updated_at = excluded.updated_at",
            params![id, payload_json, has_photo, now],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], |r| {
                JobRow::from_row(r)
            })
            .optional()?;
        Ok(row)
    })
}

/// Moves a job to a new status.
///
/// Refuses to transition a row that is already terminal. Sets
/// `completed_at` when the new status is `completed`, and stores a
/// length-bounded error message when one is given.
pub fn update_status(
    db: &Database,
    id: &str,
    status: JobStatus,
    error: Option<&str>,
    worker_id: Option<u32>,
) -> Result<(), DatabaseError> {
    let now = now_ts();
    let bounded = error.map(truncate_error);
    db.with_conn(|conn| {
        let current: Option<String> = conn
            .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .optional()?;

        if let Some(current) = current {
            if JobStatus::parse(&current).is_some_and(|s| s.is_terminal()) {
                return Err(DatabaseError::TerminalTransition {
                    id: id.to_string(),
                    status: current,
                });
            }
        }

        if status == JobStatus::Completed {
            conn.execute(
                "UPDATE jobs SET status = ?2, updated_at = ?3, completed_at = ?3,
                     worker_id = COALESCE(?4, worker_id)
                 WHERE id = ?1",
                params![id, status.as_str(), now, worker_id],
            )?;
        } else {
            conn.execute(
                "UPDATE jobs SET status = ?2, updated_at = ?3, error_message = ?4,
                     worker_id = COALESCE(?5, worker_id)
                 WHERE id = ?1",
                params![id, status.as_str(), now, bounded, worker_id],
            )?;
        }
        Ok(())
    })
}

/// Reopens a failed row for the opt-in business-failure retry policy.
///
/// This is the one sanctioned exception to the terminal-status guard: it
/// moves exactly `failed → pending`, only through the recovery path, and
/// never touches completed rows. Returns whether a row was reopened.
pub fn reopen_failed(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    let now = now_ts();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'pending', updated_at = ?2
             WHERE id = ?1 AND status = 'failed'",
            params![id, now],
        )?;
        Ok(changed > 0)
    })
}

/// Increments the retry counter. Monotonic; there is no decrement path.
pub fn increment_retry(db: &Database, id: &str) -> Result<(), DatabaseError> {
    let now = now_ts();
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET retry_count = retry_count + 1, updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    })
}

/// Rows eligible for startup recovery, oldest first.
///
/// Always includes `pending` and `processing` rows under the retry limit.
/// With `include_failed` (the business-failure retry policy) `failed` rows
/// under the limit are re-offered as well. Rows at or above the limit stay
/// where they are, so poison jobs are not reprocessed across restarts.
pub fn pending_for_recovery(
    db: &Database,
    max_retries: u32,
    include_failed: bool,
) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = if include_failed {
            "SELECT * FROM jobs
             WHERE status IN ('pending', 'processing', 'failed') AND retry_count < ?1
             ORDER BY created_at ASC"
        } else {
            "SELECT * FROM jobs
             WHERE status IN ('pending', 'processing') AND retry_count < ?1
             ORDER BY created_at ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![max_retries], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Aggregate counts for the stats endpoint.
pub fn stats(db: &Database) -> Result<JobStats, DatabaseError> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::hours(24)).to_rfc3339();
    db.with_conn(|conn| {
        let mut stats = JobStats::default();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let counts = stmt.query_map([], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?))
        })?;
        for entry in counts {
            let (status, count) = entry?;
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::Processing) => stats.processing = count,
                Some(JobStatus::Completed) => stats.completed = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => {}
            }
        }
        stats.last_24h = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE created_at >= ?1",
            params![cutoff],
            |r| r.get(0),
        )?;
        Ok(stats)
    })
}

/// Deletes completed rows older than the given cutoff timestamp.
///
/// Completed rows are retained indefinitely by default; this maintenance
/// operation is the only deletion path and nothing calls it automatically.
pub fn prune_completed(db: &Database, older_than: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM jobs WHERE status = 'completed' AND completed_at < ?1",
            params![older_than],
        )?;
        Ok(removed)
    })
}
