//! The contract between the task executor and the agent process.
//!
//! The payload travels to the agent through a JSON file ([`TaskSpec`]) and
//! the process environment (console endpoint and credentials). The agent
//! answers through its exit code (0 means success) plus a structured
//! [`RunReport`] document written to a path the executor chooses, carrying
//! the failing stage and message when there is one. Captured output is the
//! fallback when the report is missing or unreadable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::job::{ActionKind, Gender, JobPayload};

/// Environment variables the executor sets for the agent process.
pub const ENV_CONSOLE_URL: &str = "GATEHOUSE_CONSOLE_URL";
pub const ENV_CONSOLE_USERNAME: &str = "GATEHOUSE_CONSOLE_USERNAME";
pub const ENV_CONSOLE_PASSWORD: &str = "GATEHOUSE_CONSOLE_PASSWORD";
pub const ENV_WEBDRIVER_URL: &str = "GATEHOUSE_WEBDRIVER_URL";
pub const ENV_HEADLESS: &str = "GATEHOUSE_HEADLESS";

/// Everything one agent run needs, serialized to the per-job payload file.
///
/// Unlike [`JobPayload`] the photo arrives as a scratch file path; the
/// executor materializes the ephemeral copy before spawning the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub job_id: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_plate: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<PathBuf>,
    #[serde(default)]
    pub action: ActionKind,
}

impl TaskSpec {
    pub fn from_payload(job_id: &str, payload: &JobPayload, photo_path: Option<PathBuf>) -> Self {
        Self {
            job_id: job_id.to_string(),
            name: payload.name.clone(),
            phone: payload.phone.clone(),
            document: payload.document.clone(),
            vehicle_plate: payload.vehicle_plate.clone(),
            gender: payload.gender,
            validity_days: payload.validity_days,
            host_name: payload.host_name.clone(),
            photo_path,
            action: payload.action,
        }
    }

    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Structured result document written by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub job_id: String,
    pub success: bool,
    /// The click sequence went through but the console showed no explicit
    /// success feedback. Treated as success, surfaced for diagnostics.
    #[serde(default)]
    pub soft_success: bool,
    /// Name of the stage a failure occurred in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

impl RunReport {
    pub fn success(job_id: &str, soft: bool, started_at: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            success: true,
            soft_success: soft,
            stage: None,
            error: None,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn failure(job_id: &str, stage: &str, error: &str, started_at: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            success: false,
            soft_success: false,
            stage: Some(stage.to_string()),
            error: Some(error.to_string()),
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
