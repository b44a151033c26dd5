//! Declarative element location.
//!
//! Every lookup against the console goes through an ordered list of
//! locator strategies tried until one yields an element that is found,
//! displayed and enabled. Stage logic declares *what* it wants; the chain
//! evaluation here owns the waiting, polling and fallback mechanics, which
//! keeps vendor-markup quirks out of the stage code and tolerates minor
//! markup variation and timing jitter.

use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;

/// Poll interval while waiting for a chain entry.
const POLL: Duration = Duration::from_millis(250);

/// One element-location strategy.
#[derive(Debug, Clone, Copy)]
pub enum Locator {
    Css(&'static str),
    XPath(&'static str),
}

impl Locator {
    pub fn by(&self) -> By {
        match *self {
            Locator::Css(sel) => By::Css(sel),
            Locator::XPath(sel) => By::XPath(sel),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(sel) => write!(f, "css:{}", sel),
            Locator::XPath(sel) => write!(f, "xpath:{}", sel),
        }
    }
}

/// Walks the chain until one locator produces a usable element.
///
/// Each entry gets `per_entry` of wall-clock wait; only when the whole
/// chain is exhausted does the lookup escalate to `TransientUi`.
pub async fn find_first(
    driver: &WebDriver,
    chain: &[Locator],
    per_entry: Duration,
    description: &str,
) -> Result<WebElement, StageError> {
    for locator in chain {
        match driver
            .query(locator.by())
            .wait(per_entry, POLL)
            .first()
            .await
        {
            Ok(element) => {
                let displayed = element.is_displayed().await.unwrap_or(false);
                let enabled = element.is_enabled().await.unwrap_or(false);
                if displayed && enabled {
                    tracing::debug!("{} resolved via {}", description, locator);
                    return Ok(element);
                }
                tracing::debug!("{} found via {} but not interactable", description, locator);
            }
            Err(_) => {
                tracing::debug!("{} not found via {}", description, locator);
            }
        }
    }

    Err(StageError::TransientUi {
        description: description.to_string(),
        waited_ms: (per_entry.as_millis() as u64) * chain.len() as u64,
    })
}

/// Like [`find_first`] but tolerates elements the driver reports as
/// hidden; file inputs and radio controls are routinely styled away.
pub async fn find_present(
    driver: &WebDriver,
    chain: &[Locator],
    per_entry: Duration,
    description: &str,
) -> Result<WebElement, StageError> {
    for locator in chain {
        if let Ok(element) = driver
            .query(locator.by())
            .wait(per_entry, POLL)
            .first()
            .await
        {
            tracing::debug!("{} present via {}", description, locator);
            return Ok(element);
        }
    }

    Err(StageError::TransientUi {
        description: description.to_string(),
        waited_ms: (per_entry.as_millis() as u64) * chain.len() as u64,
    })
}

/// The `n`th match for a selector, regardless of visibility.
pub async fn find_nth(
    driver: &WebDriver,
    by: By,
    n: usize,
    description: &str,
) -> Result<WebElement, StageError> {
    let elements = driver.find_all(by).await?;
    elements
        .into_iter()
        .nth(n)
        .ok_or_else(|| StageError::TransientUi {
            description: format!("{} (occurrence {})", description, n + 1),
            waited_ms: 0,
        })
}

/// Types a value one character at a time with a small inter-character
/// delay; the console's debounced validation drops characters that arrive
/// in a single burst.
pub async fn type_slowly(
    element: &WebElement,
    text: &str,
    delay: Duration,
) -> Result<(), StageError> {
    for ch in text.chars() {
        element.send_keys(ch.to_string()).await?;
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

/// Short settle pause between interactions.
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Renders a special key as a sendable string.
pub fn key(k: Key) -> String {
    (k + "").to_string()
}
