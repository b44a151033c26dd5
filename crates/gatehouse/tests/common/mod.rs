//! Test harness for isolated end-to-end queue runs.
//!
//! Builds a complete environment around a stub agent script: temporary
//! photo/scratch directories, an in-memory-style SQLite file database and
//! a queue wired through `gatehouse::queue::start`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use gatehouse::config::{Config, ConsoleConfig, ExecutorConfig, QueueConfig};
use gatehouse::db::{job_repo, Database};
use gatehouse::job::{JobPayload, JobStatus};
use gatehouse::photos::PhotoStore;
use gatehouse::queue::{self, Dispatcher, WorkerPool};

pub struct TestHarness {
    pub tmp: TempDir,
    pub db: Database,
    pub config: Config,
    pub photos: Arc<PhotoStore>,
}

impl TestHarness {
    /// Builds a harness whose agent binary is a shell script with the
    /// given body.
    pub fn with_agent(agent_body: &str) -> Self {
        Self::with_agent_and_queue(agent_body, QueueConfig::default())
    }

    pub fn with_agent_and_queue(agent_body: &str, queue: QueueConfig) -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let agent = write_stub_agent(tmp.path(), agent_body);

        let db = Database::open(&tmp.path().join("gatehouse.db")).expect("database");
        let photos = Arc::new(
            PhotoStore::new(tmp.path().join("photos"), tmp.path().join("temp"), db.clone())
                .expect("photo store"),
        );

        let config = Config {
            version: "1.0".to_string(),
            database_path: Some(tmp.path().join("gatehouse.db")),
            photo_directory: tmp.path().join("photos"),
            scratch_directory: tmp.path().join("temp"),
            scratch_max_age_hours: 24,
            queue,
            executor: ExecutorConfig {
                agent_binary: agent,
                timeout_secs: 10,
                output_limit_bytes: 64 * 1024,
            },
            console: ConsoleConfig {
                url: "http://127.0.0.1:8090".to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
                webdriver_url: "http://127.0.0.1:9515".to_string(),
                headless: true,
            },
        };

        Self {
            tmp,
            db,
            config,
            photos,
        }
    }

    pub fn start(&self) -> (Dispatcher, WorkerPool) {
        queue::start(&self.config, self.db.clone(), Arc::clone(&self.photos))
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.tmp.path().join("temp")
    }

    /// Blocks until the job reaches a terminal status.
    pub fn wait_terminal(&self, job_id: &str, deadline: Duration) -> JobStatus {
        let start = Instant::now();
        loop {
            if let Some(row) = job_repo::find_by_id(&self.db, job_id).expect("find job") {
                if let Some(status) = row.status() {
                    if status.is_terminal() {
                        return status;
                    }
                }
            }
            assert!(
                start.elapsed() < deadline,
                "job {} did not terminate in {:?}",
                job_id,
                deadline
            );
            std::thread::sleep(Duration::from_millis(25));
        }
    }
}

pub fn payload(name: &str) -> JobPayload {
    JobPayload {
        name: name.to_string(),
        phone: "11999999999".to_string(),
        document: "12345678".to_string(),
        vehicle_plate: None,
        gender: Default::default(),
        validity_days: None,
        host_name: Some("Lucca Lacerda".to_string()),
        photo_base64: None,
        action: Default::default(),
    }
}

#[cfg(unix)]
pub fn write_stub_agent(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("stub-agent.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write stub agent");
    let mut perms = std::fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub");
    path
}
