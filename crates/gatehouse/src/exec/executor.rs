//! Runs the agent binary for one job: payload file in, report document
//! out, bounded by a wall-clock timeout, with guaranteed artifact cleanup
//! on every exit route.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::{resolve_secret, ConsoleConfig, ExecutorConfig};
use crate::error::ExecError;
use crate::exec::report::{
    RunReport, TaskSpec, ENV_CONSOLE_PASSWORD, ENV_CONSOLE_URL, ENV_CONSOLE_USERNAME,
    ENV_HEADLESS, ENV_WEBDRIVER_URL,
};
use crate::job::JobPayload;

/// Poll interval while waiting for the agent to exit.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Outcome of one agent run, after report parsing and output capture.
#[derive(Debug)]
pub struct ExecOutcome {
    pub success: bool,
    pub soft_success: bool,
    /// Failing stage, when the agent reported one.
    pub stage: Option<String>,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

pub struct TaskExecutor {
    scratch_dir: PathBuf,
    executor: ExecutorConfig,
    console: ConsoleConfig,
}

impl TaskExecutor {
    pub fn new(scratch_dir: PathBuf, executor: ExecutorConfig, console: ConsoleConfig) -> Self {
        Self {
            scratch_dir,
            executor,
            console,
        }
    }

    fn payload_path(&self, job_id: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("job_{}.json", sanitize_id(job_id)))
    }

    fn report_path(&self, job_id: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("job_{}.report.json", sanitize_id(job_id)))
    }

    fn cancel_path(&self, job_id: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("job_{}.cancel", sanitize_id(job_id)))
    }

    /// Requests cooperative cancellation: the agent polls for the sentinel
    /// file between stages and aborts. Takes effect only while the job's
    /// payload artifacts still exist.
    pub fn request_cancel(&self, job_id: &str) -> Result<(), ExecError> {
        std::fs::write(self.cancel_path(job_id), b"")?;
        Ok(())
    }

    /// Executes the agent for one job.
    ///
    /// `ephemeral_photo` is the scratch copy prepared by the caller; it is
    /// removed here together with the payload, report and cancel files,
    /// whatever way the run ends.
    pub fn run(
        &self,
        job_id: &str,
        payload: &JobPayload,
        ephemeral_photo: Option<PathBuf>,
    ) -> Result<ExecOutcome, ExecError> {
        std::fs::create_dir_all(&self.scratch_dir)?;

        let payload_path = self.payload_path(job_id);
        let report_path = self.report_path(job_id);
        let cancel_path = self.cancel_path(job_id);

        // Owns every per-run artifact; Drop runs on success, failure and
        // early return alike.
        let _cleanup = ArtifactCleanup {
            paths: vec![
                payload_path.clone(),
                report_path.clone(),
                cancel_path.clone(),
            ],
            photo: ephemeral_photo.clone(),
        };

        let spec = TaskSpec::from_payload(job_id, payload, ephemeral_photo);
        spec.write(&payload_path)?;

        let username = resolve_secret(&self.console.username)
            .map_err(|e| ExecError::Io(std::io::Error::other(e.to_string())))?;
        let password = resolve_secret(&self.console.password)
            .map_err(|e| ExecError::Io(std::io::Error::other(e.to_string())))?;

        let mut cmd = Command::new(&self.executor.agent_binary);
        cmd.arg("--payload")
            .arg(&payload_path)
            .arg("--report")
            .arg(&report_path)
            .arg("--job-id")
            .arg(job_id)
            .env(ENV_CONSOLE_URL, &self.console.url)
            .env(ENV_CONSOLE_USERNAME, username)
            .env(ENV_CONSOLE_PASSWORD, password)
            .env(ENV_WEBDRIVER_URL, &self.console.webdriver_url)
            .env(ENV_HEADLESS, if self.console.headless { "1" } else { "0" })
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::info!(
            "Launching agent for job {} ({} action, timeout {}s)",
            job_id,
            payload.action,
            self.executor.timeout_secs
        );

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: self.executor.agent_binary.clone(),
            source: e,
        })?;

        // Drain output on separate threads so a chatty agent cannot fill
        // the pipe and deadlock against our wait loop.
        let stdout_reader = spawn_reader(child.stdout.take(), self.executor.output_limit_bytes);
        let stderr_reader = spawn_reader(child.stderr.take(), self.executor.output_limit_bytes);

        let status = match self.wait_with_deadline(&mut child, start) {
            Ok(status) => status,
            Err(e) => {
                // Timeout or wait failure; reap what the agent managed to say.
                let _ = stdout_reader.join();
                let _ = stderr_reader.join();
                return Err(e);
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        log::info!(
            "Agent for job {} exited with code {} after {:.1}s",
            job_id,
            exit_code,
            duration.as_secs_f64()
        );

        // The exit code is authoritative; the report refines it with the
        // failing stage when both agree a failure happened.
        let report = RunReport::load(&report_path);
        let success = status.success();
        let (soft_success, stage, error) = match report {
            Some(report) => (
                report.soft_success && success,
                report.stage.filter(|_| !success),
                report.error.filter(|_| !success),
            ),
            None => (false, None, None),
        };

        let error = if success {
            None
        } else {
            Some(error.unwrap_or_else(|| fallback_error(exit_code, &stderr, &stdout)))
        };

        Ok(ExecOutcome {
            success,
            soft_success,
            stage,
            error,
            stdout,
            stderr,
            duration,
        })
    }

    fn wait_with_deadline(
        &self,
        child: &mut Child,
        start: Instant,
    ) -> Result<std::process::ExitStatus, ExecError> {
        let limit = Duration::from_secs(self.executor.timeout_secs);
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() >= limit {
                log::warn!(
                    "Agent exceeded the {}s budget, killing process",
                    self.executor.timeout_secs
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Timeout {
                    limit_secs: self.executor.timeout_secs,
                });
            }
            std::thread::sleep(WAIT_POLL);
        }
    }
}

/// Removes per-run scratch artifacts on drop. Removal is best-effort; a
/// leftover file is picked up by the periodic scratch purge.
struct ArtifactCleanup {
    paths: Vec<PathBuf>,
    photo: Option<PathBuf>,
}

impl Drop for ArtifactCleanup {
    fn drop(&mut self) {
        for path in &self.paths {
            remove_quiet(path);
        }
        if let Some(photo) = &self.photo {
            remove_quiet(photo);
        }
    }
}

fn remove_quiet(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Failed to remove artifact {}: {}", path.display(), e);
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    handle: Option<R>,
    limit: usize,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(handle) = handle {
            let _ = handle.take(limit as u64).read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Last-resort error string when the agent left no usable report.
fn fallback_error(exit_code: i32, stderr: &str, stdout: &str) -> String {
    let detail = stderr
        .lines()
        .chain(stdout.lines())
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output captured");
    format!("agent exited with code {}: {}", exit_code, detail.trim())
}

/// Keeps job ids filesystem-safe for artifact names.
fn sanitize_id(job_id: &str) -> String {
    job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
