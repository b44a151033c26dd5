//! The queue dispatcher: accepts new jobs, and on process startup scans
//! the job store to re-enqueue unfinished work.
//!
//! Owned explicitly (no module-level globals): the daemon builds one,
//! hands it to the HTTP layer by reference, and drops it on shutdown.

use crossbeam_channel::Sender;
use log::{error, info, warn};

use crate::db::job_repo::{self, JobStats};
use crate::db::{log_repo, Database};
use crate::error::{GatehouseError, QueueError};
use crate::exec::TaskExecutor;
use crate::job::{JobPayload, WorkItem};
use crate::queue::worker::ActiveJobs;
use std::sync::Arc;

/// Status view merged from the job row and the in-memory active map.
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: String,
    pub status: String,
    pub retry_count: u32,
    pub worker_id: Option<u32>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    /// Set when a worker currently holds (or recently finished) the job.
    pub in_flight: bool,
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub jobs: JobStats,
    pub active: usize,
    pub processing_now: usize,
    pub worker_count: usize,
}

pub struct Dispatcher {
    db: Database,
    sender: Sender<WorkItem>,
    active: ActiveJobs,
    executor: Arc<TaskExecutor>,
    max_retries: u32,
    retry_failed_jobs: bool,
    worker_count: usize,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        db: Database,
        sender: Sender<WorkItem>,
        active: ActiveJobs,
        executor: Arc<TaskExecutor>,
        max_retries: u32,
        retry_failed_jobs: bool,
        worker_count: usize,
    ) -> Self {
        Self {
            db,
            sender,
            active,
            executor,
            max_retries,
            retry_failed_jobs,
            worker_count,
        }
    }

    /// Persists a new job and offers it to the workers.
    ///
    /// Idempotent at the store level; a duplicate submission refreshes the
    /// payload without resetting lifecycle state.
    pub fn submit(&self, job_id: &str, payload: JobPayload) -> Result<(), GatehouseError> {
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| QueueError::InvalidPayload(e.to_string()))?;

        job_repo::insert(&self.db, job_id, &payload_json, payload.has_photo())?;
        log_repo::append(&self.db, job_id, "INFO", "job accepted").ok();

        self.sender
            .send(WorkItem::fresh(job_id, payload))
            .map_err(|_| QueueError::ChannelClosed)?;

        info!("Job {} queued", job_id);
        Ok(())
    }

    /// Re-enqueues unfinished rows after a restart.
    ///
    /// Rows at or above the retry limit are left failed and not re-offered,
    /// so a poison job cannot loop across restarts. Returns the number of
    /// jobs recovered.
    pub fn recover(&self) -> Result<usize, GatehouseError> {
        let rows = job_repo::pending_for_recovery(&self.db, self.max_retries, self.retry_failed_jobs)?;
        info!("Recovering {} unfinished job(s)", rows.len());

        let mut recovered = 0;
        for row in rows {
            // Failed rows only show up under the opt-in retry policy and
            // must be explicitly reopened past the terminal-status guard.
            if row.status == "failed" && !job_repo::reopen_failed(&self.db, &row.id)? {
                continue;
            }

            let payload: JobPayload = match serde_json::from_str(&row.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    // A row we cannot parse can never run; fail it once
                    // instead of re-reading it on every restart.
                    warn!("Job {} has an unreadable payload: {}", row.id, e);
                    job_repo::update_status(
                        &self.db,
                        &row.id,
                        crate::job::JobStatus::Failed,
                        Some(&format!("unreadable payload: {}", e)),
                        None,
                    )
                    .ok();
                    continue;
                }
            };

            if self
                .sender
                .send(WorkItem::recovered(&row.id, payload))
                .is_err()
            {
                error!("Work queue closed during recovery");
                return Err(QueueError::ChannelClosed.into());
            }
            log_repo::append(&self.db, &row.id, "INFO", "re-queued by startup recovery").ok();
            recovered += 1;
        }

        Ok(recovered)
    }

    /// Full status for one job: store row plus in-flight marker.
    pub fn status(&self, job_id: &str) -> Result<JobView, GatehouseError> {
        let row = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        let active = self.active.get(job_id);

        Ok(JobView {
            id: row.id,
            status: row.status,
            retry_count: row.retry_count,
            worker_id: active.as_ref().map(|a| a.worker_id).or(row.worker_id),
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            in_flight: active.is_some(),
        })
    }

    /// Aggregate statistics for the stats endpoint.
    pub fn stats(&self) -> Result<QueueStats, GatehouseError> {
        Ok(QueueStats {
            jobs: job_repo::stats(&self.db)?,
            active: self.active.snapshot().len(),
            processing_now: self.active.processing_count(),
            worker_count: self.worker_count,
        })
    }

    /// Diagnostic log lines for one job.
    pub fn logs(&self, job_id: &str) -> Result<Vec<crate::db::log_repo::LogRow>, GatehouseError> {
        Ok(log_repo::for_job(&self.db, job_id)?)
    }

    /// Cooperative cancellation; takes effect at the agent's next
    /// between-stage poll.
    pub fn request_cancel(&self, job_id: &str) -> Result<(), GatehouseError> {
        self.executor.request_cancel(job_id)?;
        log_repo::append(&self.db, job_id, "INFO", "cancellation requested").ok();
        Ok(())
    }
}
