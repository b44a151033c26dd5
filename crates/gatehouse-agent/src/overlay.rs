//! Dismissal of the console's transient advisory dialogs.
//!
//! The console interleaves work with blocking message boxes ("component
//! service unavailable" and friends). They are dismissed via an explicit
//! close control, then the escape key, then direct removal, in that
//! order. A click that lands on one raises an intercepted-interaction
//! error; such clicks get exactly one dismiss-and-retry cycle before the
//! stage fails.

use std::time::Duration;

use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{key, settle};

/// Selectors for dialog wrappers and their close controls.
const DIALOG_WRAPPERS: &str = ".el-message-box__wrapper, .el-message-box, .el-popover";
const CLOSE_CONTROLS: &str =
    "button.el-message-box__headerbtn, .el-message-box__close, button.close";
const CONFIRM_CONTROLS: &str =
    "//button[.//span[normalize-space(text())='OK'] or .//span[normalize-space(text())='Confirmar'] or .//span[normalize-space(text())='Cancelar']]";

const REMOVE_DIALOGS_SCRIPT: &str = r#"
var boxes = document.querySelectorAll('.el-message-box__wrapper, .el-message-box, .el-popover');
boxes.forEach(function (box) {
    box.style.display = 'none';
    box.remove();
});
"#;

/// Dismisses any visible advisory dialog. Best-effort: the sweep never
/// fails the run on its own.
pub async fn sweep(driver: &WebDriver) {
    if !dialog_visible(driver).await {
        return;
    }

    // 1. Explicit close control.
    if click_any(driver, By::Css(CLOSE_CONTROLS)).await
        || click_any(driver, By::XPath(CONFIRM_CONTROLS)).await
    {
        tracing::debug!("advisory dialog closed via control");
        settle(Duration::from_millis(500)).await;
        return;
    }

    // 2. Escape key.
    let escape = key(Key::Escape);
    if driver
        .action_chain()
        .send_keys(&escape)
        .perform()
        .await
        .is_ok()
    {
        settle(Duration::from_millis(300)).await;
        if !dialog_visible(driver).await {
            tracing::debug!("advisory dialog closed via escape");
            return;
        }
    }

    // 3. Direct removal.
    if driver.execute(REMOVE_DIALOGS_SCRIPT, vec![]).await.is_ok() {
        tracing::debug!("advisory dialog removed from the DOM");
    }
    settle(Duration::from_millis(300)).await;
}

/// Clicks with the interception policy applied: one overlay dismissal and
/// one retry, then escalate.
pub async fn click_guarded(
    driver: &WebDriver,
    element: &WebElement,
    description: &str,
) -> Result<(), StageError> {
    sweep(driver).await;

    match element.click().await {
        Ok(()) => {
            sweep(driver).await;
            Ok(())
        }
        Err(e) if is_intercepted(&e) => {
            tracing::debug!("click on {} intercepted, dismissing overlay once", description);
            sweep(driver).await;
            match element.click().await {
                Ok(()) => {
                    sweep(driver).await;
                    Ok(())
                }
                Err(e) if is_intercepted(&e) => {
                    Err(StageError::Intercepted(description.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// A click refused because another element would receive it. The driver
/// encodes the WebDriver "element click intercepted" / "element not
/// interactable" codes in the error text.
fn is_intercepted(error: &WebDriverError) -> bool {
    let text = error.to_string().to_lowercase();
    text.contains("click intercepted") || text.contains("not interactable")
}

async fn dialog_visible(driver: &WebDriver) -> bool {
    match driver.find_all(By::Css(DIALOG_WRAPPERS)).await {
        Ok(boxes) => {
            for dialog in boxes {
                if dialog.is_displayed().await.unwrap_or(false) {
                    return true;
                }
            }
            false
        }
        Err(_) => false,
    }
}

async fn click_any(driver: &WebDriver, by: By) -> bool {
    if let Ok(buttons) = driver.find_all(by).await {
        for button in buttons {
            if button.is_displayed().await.unwrap_or(false) && button.click().await.is_ok() {
                return true;
            }
        }
    }
    false
}
