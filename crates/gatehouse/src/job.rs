use serde::{Deserialize, Serialize};

/// What the automation run should do with the visitor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Register a fresh visitor through the entry form.
    #[default]
    Create,
    /// Look up an existing record by document and renew it.
    Reactivate,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Reactivate => write!(f, "reactivate"),
        }
    }
}

/// Gender selection for the console's radio group.
///
/// The console defaults to `Unspecified`; the radio group is rendered in
/// this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    #[default]
    Unspecified,
}

/// Everything a single registration or reactivation run needs to know
/// about the visitor. Submitted by the (out-of-scope) HTTP layer and
/// persisted verbatim with the job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    /// Identity document number (searched on during reactivation).
    #[serde(default)]
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_plate: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    /// Requested validity in days. `None` or `Some(1)` keeps the console
    /// default of one day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_days: Option<u32>,
    /// Host (resident) to associate the visitor with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    /// Base64-encoded photo, optionally with a data-URL prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_base64: Option<String>,
    #[serde(default)]
    pub action: ActionKind,
}

impl JobPayload {
    pub fn has_photo(&self) -> bool {
        self.photo_base64.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Lifecycle state of a job row. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work flowing through the in-memory queue.
///
/// `retry` marks items re-enqueued by startup recovery; workers call
/// `increment_retry` for those instead of inserting a fresh row.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job_id: String,
    pub payload: JobPayload,
    pub retry: bool,
}

impl WorkItem {
    pub fn fresh(job_id: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            job_id: job_id.into(),
            payload,
            retry: false,
        }
    }

    pub fn recovered(job_id: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            job_id: job_id.into(),
            payload,
            retry: true,
        }
    }
}
