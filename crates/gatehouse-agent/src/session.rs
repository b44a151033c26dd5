//! Browser session setup and teardown.
//!
//! Jobs run concurrently, so every run gets an isolated session with its
//! own scratch profile directory, because shared browser state between two
//! half-filled visitor forms is not recoverable. In non-headless runs the
//! window position is derived deterministically from the job id so
//! side-by-side sessions do not stack on screen.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use thirtyfour::prelude::*;

use gatehouse::exec::report::{
    ENV_CONSOLE_PASSWORD, ENV_CONSOLE_URL, ENV_CONSOLE_USERNAME, ENV_HEADLESS, ENV_WEBDRIVER_URL,
};

/// Runtime settings handed over by the task executor through the process
/// environment.
#[derive(Debug, Clone)]
pub struct AgentEnv {
    pub console_url: String,
    pub username: String,
    pub password: String,
    pub webdriver_url: String,
    pub headless: bool,
}

impl AgentEnv {
    pub fn from_env() -> Result<Self, String> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| format!("missing environment variable {}", name))
        };
        Ok(Self {
            console_url: var(ENV_CONSOLE_URL)?,
            username: var(ENV_CONSOLE_USERNAME)?,
            password: var(ENV_CONSOLE_PASSWORD)?,
            webdriver_url: std::env::var(ENV_WEBDRIVER_URL)
                .unwrap_or_else(|_| "http://127.0.0.1:9515".to_string()),
            headless: std::env::var(ENV_HEADLESS).map(|v| v != "0").unwrap_or(true),
        })
    }
}

pub struct ConsoleSession {
    pub driver: WebDriver,
    profile_dir: PathBuf,
}

impl ConsoleSession {
    /// Launches an isolated browser session and opens the console.
    pub async fn launch(env: &AgentEnv, job_id: &str) -> WebDriverResult<Self> {
        let profile_dir = std::env::temp_dir().join(format!(
            "gatehouse-profile-{}-{}",
            sanitize(job_id),
            std::process::id()
        ));
        let _ = std::fs::create_dir_all(&profile_dir);

        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--disable-extensions")?;
        caps.add_arg("--no-first-run")?;
        caps.add_arg("--no-default-browser-check")?;
        caps.add_arg("--window-size=1280,900")?;
        caps.add_arg(&format!("--user-data-dir={}", profile_dir.display()))?;
        if env.headless {
            caps.add_arg("--headless=new")?;
        } else {
            let (x, y) = window_offset(job_id);
            caps.add_arg(&format!("--window-position={},{}", x, y))?;
        }

        let driver = WebDriver::new(&env.webdriver_url, caps).await?;

        tracing::info!("Opening console at {}", env.console_url);
        driver.goto(&env.console_url).await?;

        Ok(Self {
            driver,
            profile_dir,
        })
    }

    /// Quits the browser and removes the scratch profile. Called on every
    /// exit route; teardown problems are logged, never propagated.
    pub async fn close(self) {
        if let Err(e) = self.driver.quit().await {
            tracing::warn!("Browser session did not quit cleanly: {}", e);
        }
        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            tracing::debug!(
                "Scratch profile {} not removed: {}",
                self.profile_dir.display(),
                e
            );
        }
    }
}

/// Deterministic window placement on a 3x2 grid, keyed by job id.
pub fn window_offset(job_id: &str) -> (i64, i64) {
    let mut hasher = DefaultHasher::new();
    job_id.hash(&mut hasher);
    let h = hasher.finish();
    let column = (h % 3) as i64;
    let row = ((h / 3) % 2) as i64;
    (column * 640, row * 520)
}

fn sanitize(job_id: &str) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_offset_is_deterministic() {
        assert_eq!(window_offset("job-1"), window_offset("job-1"));
    }

    #[test]
    fn test_window_offset_stays_on_grid() {
        for id in ["a", "b", "c", "visitor_x_1", "visitor_y_2"] {
            let (x, y) = window_offset(id);
            assert!(x >= 0 && x <= 1280, "x out of grid for {}: {}", id, x);
            assert!(y >= 0 && y <= 520, "y out of grid for {}: {}", id, y);
            assert_eq!(x % 640, 0);
            assert_eq!(y % 520, 0);
        }
    }

    #[test]
    fn test_sanitize_profile_component() {
        assert_eq!(sanitize("visitor_1-a"), "visitor_1-a");
        assert_eq!(sanitize("a/b c"), "a-b-c");
    }
}
