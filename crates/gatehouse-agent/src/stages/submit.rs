//! Submission and the confirmation chain.
//!
//! The primary "Entrada" action is followed by preview → apply → close,
//! each with its own short timeout and fallbacks. The console's feedback
//! is inconsistent: a missing success message after a fully clicked-out
//! chain is a soft success, not a failure.

use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_first, settle, Locator};
use crate::overlay::{click_guarded, sweep};

const SUBMIT_BUTTON: &[Locator] = &[
    Locator::XPath("//button[@title='Entrada']//span[text()='Entrada']"),
    Locator::Css("button[title='Entrada']"),
    Locator::XPath("//button[contains(@class, 'el-button--primary') and contains(., 'Entrada')]"),
];

const PREVIEW_BUTTON: &[Locator] = &[
    Locator::XPath("//button[contains(@class, 'el-button--link')]//span[text()='Visualizar']"),
    Locator::XPath("//span[text()='Visualizar']/parent::button"),
];

const APPLY_BUTTON: &[Locator] = &[
    Locator::XPath("//button[contains(@class, 'el-button--primary')]//span[text()='Aplicar agora']"),
    Locator::XPath("//span[text()='Aplicar agora']/parent::button"),
];

const CLOSE_BUTTON: &[Locator] = &[
    Locator::XPath("//button[contains(@class, 'el-button--default')]//span[text()='Fechar']"),
    Locator::XPath("//span[text()='Fechar']/parent::button"),
];

const SUCCESS_MESSAGE: &[Locator] = &[Locator::XPath(
    "//*[contains(text(), 'sucesso') or contains(text(), 'Sucesso') or contains(text(), 'success')]",
)];

/// Clicks the primary submit action.
pub async fn submit_entry(driver: &WebDriver) -> Result<(), StageError> {
    driver
        .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
        .await?;
    settle(Duration::from_millis(300)).await;

    let button = find_first(driver, SUBMIT_BUTTON, Duration::from_secs(3), "submit button").await?;
    button.scroll_into_view().await?;
    click_guarded(driver, &button, "submit button").await?;

    // The console persists the record and redraws before the confirmation
    // controls appear.
    settle(Duration::from_secs(5)).await;
    tracing::info!("Entry submitted");
    Ok(())
}

/// Preview → apply → close. Returns whether the console showed an
/// explicit success message.
pub async fn confirm_and_persist(driver: &WebDriver) -> Result<bool, StageError> {
    driver.execute("window.scrollTo(0, 0);", vec![]).await?;
    settle(Duration::from_millis(300)).await;

    // Preview is informational; a build without it still applies fine.
    match find_first(driver, PREVIEW_BUTTON, Duration::from_secs(3), "preview button").await {
        Ok(button) => {
            click_guarded(driver, &button, "preview button").await?;
            settle(Duration::from_secs(2)).await;
        }
        Err(_) => tracing::debug!("No preview control; continuing to apply"),
    }

    let apply = find_first(driver, APPLY_BUTTON, Duration::from_secs(3), "apply button").await?;
    click_guarded(driver, &apply, "apply button").await?;
    settle(Duration::from_secs(3)).await;

    match find_first(driver, CLOSE_BUTTON, Duration::from_secs(3), "close button").await {
        Ok(button) => {
            click_guarded(driver, &button, "close button").await?;
        }
        Err(_) => tracing::debug!("No close control after apply"),
    }

    // Give the backend sync a moment before we tear the session down.
    settle(Duration::from_secs(5)).await;
    sweep(driver).await;

    let explicit = find_first(
        driver,
        SUCCESS_MESSAGE,
        Duration::from_secs(2),
        "success message",
    )
    .await
    .is_ok();

    if explicit {
        tracing::info!("Console confirmed the registration");
    } else {
        tracing::warn!("No explicit success message; treating as soft success");
    }

    Ok(explicit)
}
