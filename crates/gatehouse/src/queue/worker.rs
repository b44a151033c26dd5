//! The worker pool: N long-lived OS threads that dequeue jobs, drive the
//! task executor and keep the job store current.
//!
//! Jobs are removed from the queue by a single `recv`, so at most one
//! worker ever owns a given job id. The mutex-guarded active map is the
//! only shared mutable structure; the store's single-row updates need no
//! extra locking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use tracing::info_span;

use crate::db::{job_repo, log_repo, Database};
use crate::error::ExecError;
use crate::exec::TaskExecutor;
use crate::job::{JobStatus, WorkItem};
use crate::photos::PhotoStore;

/// One entry in the in-memory active map.
#[derive(Debug, Clone)]
pub struct ActiveEntry {
    pub worker_id: u32,
    pub status: JobStatus,
    pub started_at: String,
    finished: Option<Instant>,
}

/// Mutex-guarded view of the jobs currently owned by workers.
///
/// Terminal entries linger for a grace period so status queries taken just
/// after completion still see the in-flight record, then are purged.
#[derive(Clone, Default)]
pub struct ActiveJobs {
    inner: Arc<Mutex<HashMap<String, ActiveEntry>>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, job_id: &str, worker_id: u32) {
        let entry = ActiveEntry {
            worker_id,
            status: JobStatus::Processing,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished: None,
        };
        if let Ok(mut map) = self.inner.lock() {
            map.insert(job_id.to_string(), entry);
        }
    }

    fn finish(&self, job_id: &str, status: JobStatus) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(entry) = map.get_mut(job_id) {
                entry.status = status;
                entry.finished = Some(Instant::now());
            }
        }
    }

    fn purge_expired(&self, grace: Duration) {
        if let Ok(mut map) = self.inner.lock() {
            map.retain(|_, entry| match entry.finished {
                Some(finished) => finished.elapsed() < grace,
                None => true,
            });
        }
    }

    pub fn get(&self, job_id: &str) -> Option<ActiveEntry> {
        self.inner.lock().ok()?.get(job_id).cloned()
    }

    pub fn processing_count(&self) -> usize {
        self.inner
            .lock()
            .map(|map| {
                map.values()
                    .filter(|e| e.status == JobStatus::Processing)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<(String, ActiveEntry)> {
        self.inner
            .lock()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    active: ActiveJobs,
}

/// Everything a worker thread needs, cloned per thread.
#[derive(Clone)]
struct WorkerContext {
    db: Database,
    executor: Arc<TaskExecutor>,
    photos: Arc<PhotoStore>,
    active: ActiveJobs,
    dequeue_wait: Duration,
    grace_period: Duration,
}

impl WorkerPool {
    /// Starts `worker_count` threads consuming from `receiver`.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn start(
        worker_count: usize,
        receiver: Receiver<WorkItem>,
        db: Database,
        executor: Arc<TaskExecutor>,
        photos: Arc<PhotoStore>,
        dequeue_wait: Duration,
        grace_period: Duration,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");

        let shutdown = Arc::new(AtomicBool::new(false));
        let active = ActiveJobs::new();
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count as u32 {
            let job_rx = receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let ctx = WorkerContext {
                db: db.clone(),
                executor: Arc::clone(&executor),
                photos: Arc::clone(&photos),
                active: active.clone(),
                dequeue_wait,
                grace_period,
            };

            let handle = thread::spawn(move || {
                run_worker(worker_id, job_rx, shutdown_flag, ctx);
            });
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            workers,
            shutdown,
            active,
        }
    }

    pub fn active_jobs(&self) -> ActiveJobs {
        self.active.clone()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: u32,
    job_receiver: Receiver<WorkItem>,
    shutdown: Arc<AtomicBool>,
    ctx: WorkerContext,
) {
    debug!("Worker {} started", worker_id);

    loop {
        ctx.active.purge_expired(ctx.grace_period);

        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(ctx.dequeue_wait) {
            Ok(item) => process_item(worker_id, &ctx, item),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn process_item(worker_id: u32, ctx: &WorkerContext, item: WorkItem) {
    let _span = info_span!("job", job_id = %item.job_id, worker_id, retry = item.retry).entered();
    info!(
        "Worker {} processing job {} ({})",
        worker_id, item.job_id, item.payload.action
    );

    ctx.active.claim(&item.job_id, worker_id);

    // Bookkeeping before execution: fresh jobs are (idempotently) inserted,
    // recovered ones consume one retry.
    let bookkeeping = if item.retry {
        job_repo::increment_retry(&ctx.db, &item.job_id)
    } else {
        let payload_json = serde_json::to_string(&item.payload).unwrap_or_else(|_| "{}".into());
        job_repo::insert(
            &ctx.db,
            &item.job_id,
            &payload_json,
            item.payload.has_photo(),
        )
    };
    if let Err(e) = bookkeeping {
        // Store unreachable; surface it and leave the job to recovery.
        error!("Worker {} store error for {}: {}", worker_id, item.job_id, e);
        ctx.active.finish(&item.job_id, JobStatus::Failed);
        return;
    }

    if let Err(e) = job_repo::update_status(
        &ctx.db,
        &item.job_id,
        JobStatus::Processing,
        None,
        Some(worker_id),
    ) {
        // A terminal row cannot be re-processed; drop the stale queue item.
        warn!(
            "Worker {} cannot claim {}: {}, skipping",
            worker_id, item.job_id, e
        );
        ctx.active.finish(&item.job_id, JobStatus::Failed);
        return;
    }

    // The ephemeral photo copy; a photo failure degrades to a run without
    // one rather than failing the job.
    let photo = item.payload.photo_base64.as_deref().and_then(|encoded| {
        match ctx
            .photos
            .ephemeral_copy_for_automation(&item.job_id, encoded)
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Photo for {} unusable, continuing without: {}", item.job_id, e);
                let _ = log_repo::append(
                    &ctx.db,
                    &item.job_id,
                    "WARN",
                    &format!("photo unusable: {}", e),
                );
                None
            }
        }
    });

    let (status, error) = match ctx.executor.run(&item.job_id, &item.payload, photo) {
        Ok(outcome) if outcome.success => {
            if outcome.soft_success {
                let _ = log_repo::append(
                    &ctx.db,
                    &item.job_id,
                    "WARN",
                    "no explicit success feedback from console (soft success)",
                );
            }
            if !outcome.stdout.is_empty() {
                let _ = log_repo::append(&ctx.db, &item.job_id, "INFO", &outcome.stdout);
            }
            (JobStatus::Completed, None)
        }
        Ok(outcome) => {
            let message = outcome
                .error
                .unwrap_or_else(|| "automation run failed".to_string());
            let detail = match &outcome.stage {
                Some(stage) => format!("stage {}: {}", stage, message),
                None => message.clone(),
            };
            let _ = log_repo::append(&ctx.db, &item.job_id, "ERROR", &detail);
            if !outcome.stderr.is_empty() {
                let _ = log_repo::append(&ctx.db, &item.job_id, "ERROR", &outcome.stderr);
            }
            (JobStatus::Failed, Some(detail))
        }
        Err(ExecError::Timeout { limit_secs }) => {
            let message = format!("automation timed out after {}s", limit_secs);
            let _ = log_repo::append(&ctx.db, &item.job_id, "ERROR", &message);
            (JobStatus::Failed, Some(message))
        }
        Err(e) => {
            let message = e.to_string();
            let _ = log_repo::append(&ctx.db, &item.job_id, "ERROR", &message);
            (JobStatus::Failed, Some(message))
        }
    };

    if let Err(e) = job_repo::update_status(
        &ctx.db,
        &item.job_id,
        status,
        error.as_deref(),
        Some(worker_id),
    ) {
        error!(
            "Worker {} failed to persist terminal status for {}: {}",
            worker_id, item.job_id, e
        );
    }

    ctx.active.finish(&item.job_id, status);

    match status {
        JobStatus::Completed => info!("Worker {} completed job {}", worker_id, item.job_id),
        _ => warn!("Worker {} failed job {}", worker_id, item.job_id),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{ConsoleConfig, ExecutorConfig};
    use crate::job::JobPayload;
    use crossbeam_channel::unbounded;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn write_stub_agent(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("stub-agent.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    struct Fixture {
        _tmp: TempDir,
        db: Database,
        receiver: Receiver<WorkItem>,
        sender: crossbeam_channel::Sender<WorkItem>,
        executor: Arc<TaskExecutor>,
        photos: Arc<PhotoStore>,
    }

    fn fixture(agent_body: &str, timeout_secs: u64) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let agent = write_stub_agent(tmp.path(), agent_body);
        let db = Database::open_in_memory().unwrap();
        let photos = Arc::new(
            PhotoStore::new(tmp.path().join("photos"), tmp.path().join("temp"), db.clone())
                .unwrap(),
        );
        let executor = Arc::new(TaskExecutor::new(
            tmp.path().join("temp"),
            ExecutorConfig {
                agent_binary: agent,
                timeout_secs,
                output_limit_bytes: 64 * 1024,
            },
            ConsoleConfig {
                url: "http://127.0.0.1:8090".to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
                webdriver_url: "http://127.0.0.1:9515".to_string(),
                headless: true,
            },
        ));
        let (sender, receiver) = unbounded();
        Fixture {
            _tmp: tmp,
            db,
            receiver,
            sender,
            executor,
            photos,
        }
    }

    fn start_pool(fixture: &Fixture, workers: usize, grace: Duration) -> WorkerPool {
        WorkerPool::start(
            workers,
            fixture.receiver.clone(),
            fixture.db.clone(),
            Arc::clone(&fixture.executor),
            Arc::clone(&fixture.photos),
            Duration::from_millis(50),
            grace,
        )
    }

    fn payload(name: &str) -> JobPayload {
        JobPayload {
            name: name.to_string(),
            phone: String::new(),
            document: "123".to_string(),
            vehicle_plate: None,
            gender: Default::default(),
            validity_days: None,
            host_name: None,
            photo_base64: None,
            action: Default::default(),
        }
    }

    fn wait_terminal(db: &Database, id: &str, deadline: Duration) -> JobStatus {
        let start = Instant::now();
        loop {
            if let Some(row) = job_repo::find_by_id(db, id).unwrap() {
                if let Some(status) = row.status() {
                    if status.is_terminal() {
                        return status;
                    }
                }
            }
            assert!(
                start.elapsed() < deadline,
                "job {} did not reach a terminal state in time",
                id
            );
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_two_jobs_on_two_workers_both_complete() {
        let fixture = fixture("sleep 0.2; exit 0", 10);
        let pool = start_pool(&fixture, 2, Duration::from_secs(60));

        fixture
            .sender
            .send(WorkItem::fresh("v1", payload("A")))
            .unwrap();
        fixture
            .sender
            .send(WorkItem::fresh("v2", payload("B")))
            .unwrap();

        // Mid-run, no more than pool capacity may be processing.
        thread::sleep(Duration::from_millis(120));
        assert!(pool.active_jobs().processing_count() <= 2);

        assert_eq!(
            wait_terminal(&fixture.db, "v1", Duration::from_secs(10)),
            JobStatus::Completed
        );
        assert_eq!(
            wait_terminal(&fixture.db, "v2", Duration::from_secs(10)),
            JobStatus::Completed
        );

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_failed_run_records_error() {
        let fixture = fixture("echo 'selector chain exhausted' >&2; exit 2", 10);
        let pool = start_pool(&fixture, 1, Duration::from_secs(60));

        fixture
            .sender
            .send(WorkItem::fresh("v1", payload("A")))
            .unwrap();

        assert_eq!(
            wait_terminal(&fixture.db, "v1", Duration::from_secs(10)),
            JobStatus::Failed
        );
        let row = job_repo::find_by_id(&fixture.db, "v1").unwrap().unwrap();
        assert!(row.error_message.unwrap().contains("selector chain exhausted"));

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_hanging_agent_times_out_and_worker_recovers() {
        let fixture = fixture("sleep 60", 1);
        let pool = start_pool(&fixture, 1, Duration::from_secs(60));

        fixture
            .sender
            .send(WorkItem::fresh("stuck", payload("A")))
            .unwrap();

        let status = wait_terminal(&fixture.db, "stuck", Duration::from_secs(15));
        assert_eq!(status, JobStatus::Failed);
        let row = job_repo::find_by_id(&fixture.db, "stuck").unwrap().unwrap();
        assert!(row.error_message.unwrap().contains("timed out"));

        // The worker must be free for new jobs shortly after the kill.
        fixture
            .sender
            .send(WorkItem::fresh("next", payload("B")))
            .unwrap();
        // The stub still sleeps 60s, so give it its own timeout window.
        assert_eq!(
            wait_terminal(&fixture.db, "next", Duration::from_secs(15)),
            JobStatus::Failed
        );

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_retry_item_consumes_a_retry() {
        let fixture = fixture("exit 0", 10);
        job_repo::insert(&fixture.db, "r1", "{}", false).unwrap();

        let pool = start_pool(&fixture, 1, Duration::from_secs(60));
        fixture
            .sender
            .send(WorkItem::recovered("r1", payload("A")))
            .unwrap();

        wait_terminal(&fixture.db, "r1", Duration::from_secs(10));
        let row = job_repo::find_by_id(&fixture.db, "r1").unwrap().unwrap();
        assert_eq!(row.retry_count, 1);

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_terminal_entry_lingers_then_purges() {
        let fixture = fixture("exit 0", 10);
        let pool = start_pool(&fixture, 1, Duration::from_millis(300));

        fixture
            .sender
            .send(WorkItem::fresh("v1", payload("A")))
            .unwrap();
        wait_terminal(&fixture.db, "v1", Duration::from_secs(10));
        thread::sleep(Duration::from_millis(50));

        // Within the grace window the terminal result is still visible.
        let entry = pool.active_jobs().get("v1");
        assert!(entry.is_some());
        assert_eq!(entry.unwrap().status, JobStatus::Completed);

        // After the grace period the idle worker's purge removes it.
        thread::sleep(Duration::from_millis(700));
        assert!(pool.active_jobs().get("v1").is_none());

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_stale_queue_item_for_terminal_row_is_skipped() {
        let fixture = fixture("exit 0", 10);
        job_repo::insert(&fixture.db, "done", "{}", false).unwrap();
        job_repo::update_status(&fixture.db, "done", JobStatus::Completed, None, None).unwrap();

        let pool = start_pool(&fixture, 1, Duration::from_secs(60));
        fixture
            .sender
            .send(WorkItem::fresh("done", payload("A")))
            .unwrap();

        thread::sleep(Duration::from_millis(500));
        let row = job_repo::find_by_id(&fixture.db, "done").unwrap().unwrap();
        // Still completed: the stale item must not re-run or flip status.
        assert_eq!(row.status, "completed");

        pool.shutdown();
        pool.wait();
    }
}
