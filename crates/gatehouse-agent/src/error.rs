use thirtyfour::error::WebDriverError;
use thiserror::Error;

use crate::stages::Stage;

/// Errors a single stage can produce.
///
/// `TransientUi` is only surfaced after the whole locator-fallback chain
/// for an element has been exhausted; `Intercepted` only after the one
/// permitted dismiss-and-retry cycle.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("no locator matched for {description} within {waited_ms}ms")]
    TransientUi { description: String, waited_ms: u64 },

    #[error("click on {0} stayed intercepted after overlay dismissal")]
    Intercepted(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("cancelled by operator")]
    Cancelled,

    #[error("webdriver error: {0}")]
    Session(#[from] WebDriverError),
}

/// A stage boundary was crossed with an unrecoverable error; the run is
/// over and this becomes the job's terminal error.
#[derive(Debug)]
pub struct RunFailure {
    pub stage: Stage,
    pub error: StageError,
}

impl RunFailure {
    pub fn new(stage: Stage, error: StageError) -> Self {
        Self { stage, error }
    }
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}
