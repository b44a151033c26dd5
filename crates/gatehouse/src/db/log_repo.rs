//! Append-only diagnostic log, one row per message keyed by job id.
//!
//! The status endpoint only exposes the job row's bounded error string;
//! full agent output lands here.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct LogRow {
    pub job_id: String,
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            level: row.get("level")?,
            message: row.get("message")?,
            timestamp: row.get("timestamp")?,
        })
    }
}

/// Appends a diagnostic message for a job.
pub fn append(db: &Database, job_id: &str, level: &str, message: &str) -> Result<(), DatabaseError> {
    let now = chrono::Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_logs (job_id, level, message, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![job_id, level, message, now],
        )?;
        Ok(())
    })
}

/// Returns all log rows for a job, oldest first.
pub fn for_job(db: &Database, job_id: &str) -> Result<Vec<LogRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM job_logs WHERE job_id = ?1 ORDER BY id ASC")?;
        let rows: Vec<LogRow> = stmt
            .query_map(params![job_id], LogRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo;

    #[test]
    fn test_append_and_read_back_in_order() {
        let db = Database::open_in_memory().unwrap();
        job_repo::insert(&db, "j1", "{}", false).unwrap();

        append(&db, "j1", "INFO", "queued").unwrap();
        append(&db, "j1", "ERROR", "stage NavigateToForm failed").unwrap();

        let rows = for_job(&db, "j1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].level, "INFO");
        assert_eq!(rows[1].message, "stage NavigateToForm failed");
    }

    #[test]
    fn test_logs_are_scoped_per_job() {
        let db = Database::open_in_memory().unwrap();
        job_repo::insert(&db, "a", "{}", false).unwrap();
        job_repo::insert(&db, "b", "{}", false).unwrap();

        append(&db, "a", "INFO", "for a").unwrap();
        append(&db, "b", "INFO", "for b").unwrap();

        let rows = for_job(&db, "a").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "for a");
    }
}
