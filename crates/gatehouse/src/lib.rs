pub mod config;
pub mod db;
pub mod error;
pub mod exec;
pub mod job;
pub mod photos;
pub mod queue;

pub use config::{load_config, resolve_secret, Config};
pub use error::{ConfigError, ExecError, GatehouseError, QueueError, Result, StorageError};
pub use exec::{ExecOutcome, RunReport, TaskExecutor, TaskSpec};
pub use job::{ActionKind, Gender, JobPayload, JobStatus, WorkItem};
pub use photos::{PhotoMetadata, PhotoStore};
pub use queue::{Dispatcher, WorkerPool};
