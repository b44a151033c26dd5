use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,

    /// SQLite database file. Defaults to `~/.gatehouse/data/gatehouse.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Permanent photo storage directory.
    #[serde(default = "default_photo_directory")]
    pub photo_directory: PathBuf,

    /// Scratch area for payload files, ephemeral photo copies and browser
    /// profiles. Contents are disposable.
    #[serde(default = "default_scratch_directory")]
    pub scratch_directory: PathBuf,

    /// Scratch photo copies older than this are purged by the periodic
    /// sweep.
    #[serde(default = "default_scratch_max_age_hours")]
    pub scratch_max_age_hours: u64,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of worker threads. Each concurrently running job owns its own
    /// browser session, so this is also the browser-session ceiling.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Recovery re-enqueue ceiling. Rows at or above this retry count stay
    /// failed across restarts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// When set, startup recovery also re-offers failed rows under the
    /// retry limit (business-failure retry policy).
    #[serde(default)]
    pub retry_failed_jobs: bool,

    /// How long a worker blocks on the queue before re-checking the
    /// shutdown flag.
    #[serde(default = "default_dequeue_wait_ms")]
    pub dequeue_wait_ms: u64,

    /// How long a finished job stays visible in the in-memory active map.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            retry_failed_jobs: false,
            dequeue_wait_ms: default_dequeue_wait_ms(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Path to the agent binary. Resolved from PATH when relative.
    #[serde(default = "default_agent_binary")]
    pub agent_binary: PathBuf,

    /// Wall-clock budget for one agent run; the process is killed when it
    /// is exceeded.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Captured stdout/stderr cap per stream.
    #[serde(default = "default_output_limit_bytes")]
    pub output_limit_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agent_binary: default_agent_binary(),
            timeout_secs: default_timeout_secs(),
            output_limit_bytes: default_output_limit_bytes(),
        }
    }
}

/// Target console endpoint and credentials.
///
/// `username` and `password` accept `env:VAR` references resolved at use,
/// so credentials never need to live in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub url: String,
    pub username: String,
    pub password: String,

    /// WebDriver endpoint the agent connects to.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_photo_directory() -> PathBuf {
    PathBuf::from("photos")
}

fn default_scratch_directory() -> PathBuf {
    PathBuf::from("temp")
}

fn default_scratch_max_age_hours() -> u64 {
    24
}

fn default_worker_count() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_dequeue_wait_ms() -> u64 {
    500
}

fn default_grace_period_secs() -> u64 {
    60
}

fn default_agent_binary() -> PathBuf {
    PathBuf::from("gatehouse-agent")
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_output_limit_bytes() -> usize {
    64 * 1024
}

fn default_webdriver_url() -> String {
    "http://127.0.0.1:9515".to_string()
}

fn default_headless() -> bool {
    true
}
