//! Photo upload through the form's file input.

use std::path::Path;
use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_present, settle, Locator};

const UPLOAD_TRIGGERS: &[Locator] = &[
    Locator::Css("canvas#imgCanvas.bg-photo_canvas"),
    Locator::XPath("//canvas[contains(@class, 'bg-photo_canvas')]/.."),
    Locator::XPath("//div[contains(@class, 'photo') or contains(@class, 'upload')]"),
];

const FILE_INPUT: &[Locator] = &[
    Locator::Css("input[type='file']"),
];

const SAVE_CONTROL: &[Locator] = &[
    Locator::XPath("//button//span[contains(text(), 'Guardar')]"),
];

pub async fn upload(driver: &WebDriver, photo_path: &Path) -> Result<(), StageError> {
    tracing::info!("Uploading photo {}", photo_path.display());

    // The file input is not always interactable until the photo area has
    // been activated with a hover/click sequence.
    activate_upload_area(driver).await;

    let input = find_present(driver, FILE_INPUT, Duration::from_secs(5), "photo file input")
        .await?;
    input.send_keys(photo_path.display().to_string()).await?;
    settle(Duration::from_secs(2)).await;

    // Some builds require an explicit save after the preview renders.
    if let Ok(save) =
        find_present(driver, SAVE_CONTROL, Duration::from_secs(2), "photo save control").await
    {
        if save.is_displayed().await.unwrap_or(false) && save.click().await.is_ok() {
            tracing::debug!("Photo save control clicked");
            settle(Duration::from_secs(1)).await;
        }
    }

    tracing::info!("Photo handed to the console");
    Ok(())
}

async fn activate_upload_area(driver: &WebDriver) {
    if let Ok(trigger) =
        find_present(driver, UPLOAD_TRIGGERS, Duration::from_secs(2), "photo upload area").await
    {
        let hovered = driver
            .action_chain()
            .move_to_element_center(&trigger)
            .perform()
            .await;
        if hovered.is_ok() {
            let _ = trigger.click().await;
            settle(Duration::from_millis(500)).await;
        }
    }
}
