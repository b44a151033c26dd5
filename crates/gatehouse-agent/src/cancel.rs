//! Cooperative cancellation.
//!
//! The executor signals cancellation by dropping a sentinel file next to
//! the payload file. The state machine polls for it between stages; an
//! in-flight stage is never preempted (a hard cancel is the executor's
//! timeout kill).

use std::path::{Path, PathBuf};

pub struct CancelToken {
    sentinel: PathBuf,
}

impl CancelToken {
    /// Derives the sentinel path from the payload file path
    /// (`job_<id>.json` → `job_<id>.cancel`).
    pub fn for_payload(payload_path: &Path) -> Self {
        Self {
            sentinel: payload_path.with_extension("cancel"),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.sentinel.exists()
    }
}
