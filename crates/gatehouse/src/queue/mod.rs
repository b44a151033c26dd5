//! Job queue: dispatcher, in-memory work channel and the worker pool.

pub mod dispatcher;
pub mod worker;

pub use dispatcher::{Dispatcher, JobView, QueueStats};
pub use worker::{ActiveJobs, WorkerPool};

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::Database;
use crate::exec::TaskExecutor;
use crate::photos::PhotoStore;

/// Wires the queue together: channel, worker pool, dispatcher.
///
/// The channel is unbounded: startup recovery may re-offer a long backlog
/// before any worker finishes, and a submit must never block the HTTP
/// caller. Call `dispatcher.recover()` after this returns.
pub fn start(
    config: &Config,
    db: Database,
    photos: Arc<PhotoStore>,
) -> (Dispatcher, WorkerPool) {
    let executor = Arc::new(TaskExecutor::new(
        config.scratch_directory.clone(),
        config.executor.clone(),
        config.console.clone(),
    ));

    let (sender, receiver) = crossbeam_channel::unbounded();

    let pool = WorkerPool::start(
        config.queue.worker_count,
        receiver,
        db.clone(),
        Arc::clone(&executor),
        photos,
        Duration::from_millis(config.queue.dequeue_wait_ms),
        Duration::from_secs(config.queue.grace_period_secs),
    );

    let dispatcher = Dispatcher::new(
        db,
        sender,
        pool.active_jobs(),
        executor,
        config.queue.max_retries,
        config.queue.retry_failed_jobs,
        config.queue.worker_count,
    );

    (dispatcher, pool)
}
