//! Gender, phone, identity document and the optional vehicle plate.

use std::time::Duration;

use thirtyfour::prelude::*;

use gatehouse::job::Gender;

use crate::error::StageError;
use crate::locator::{find_first, find_nth, settle, type_slowly, Locator};
use crate::overlay::sweep;

const TYPE_DELAY: Duration = Duration::from_millis(80);

const OTHER_INFO_SECTION: &[Locator] = &[
    Locator::XPath("//div[@title='Outras informações' and contains(@class, 'item')]"),
    Locator::XPath("//div[contains(text(), 'Outras informações')]"),
];

const PHONE_FIELD: &[Locator] = &[Locator::Css("input[maxlength='32']")];

const EXPAND_CONTROL: &[Locator] = &[Locator::XPath("//span[text()='Expandir']")];

/// Radio index for each gender, matching the console's rendering order.
pub fn radio_index(gender: Gender) -> Option<usize> {
    match gender {
        Gender::Female => Some(0),
        Gender::Male => Some(1),
        // The console default; nothing to click.
        Gender::Unspecified => None,
    }
}

pub async fn fill(
    driver: &WebDriver,
    gender: Gender,
    phone: &str,
    document: &str,
    vehicle_plate: Option<&str>,
) -> Result<(), StageError> {
    // The gender radios and contact fields sit in a collapsed section.
    expand_section(driver, OTHER_INFO_SECTION, "other information section").await;
    sweep(driver).await;

    select_gender(driver, gender).await?;

    // Bring the lower half of the form into view.
    driver.execute("window.scrollBy(0, 300);", vec![]).await?;
    settle(Duration::from_millis(500)).await;

    if !phone.is_empty() {
        let field =
            find_first(driver, PHONE_FIELD, Duration::from_secs(5), "phone field").await?;
        field.clear().await?;
        type_slowly(&field, phone, TYPE_DELAY).await?;
        settle(Duration::from_secs(1)).await;
    }
    sweep(driver).await;

    // The document and plate fields hide behind an "expand" control.
    expand_section(driver, EXPAND_CONTROL, "expand control").await;
    sweep(driver).await;

    if !document.is_empty() {
        let field = find_nth(
            driver,
            By::Css("input[maxlength='128']"),
            0,
            "document field",
        )
        .await?;
        field.clear().await?;
        type_slowly(&field, document, TYPE_DELAY).await?;
        settle(Duration::from_secs(1)).await;
    }
    sweep(driver).await;

    if let Some(plate) = vehicle_plate {
        let field = find_nth(
            driver,
            By::Css("input[maxlength='128']"),
            1,
            "vehicle plate field",
        )
        .await?;
        field.clear().await?;
        type_slowly(&field, plate, TYPE_DELAY).await?;
        settle(Duration::from_secs(1)).await;
    }
    sweep(driver).await;

    tracing::info!("Contact and document section filled");
    Ok(())
}

async fn select_gender(driver: &WebDriver, gender: Gender) -> Result<(), StageError> {
    let Some(index) = radio_index(gender) else {
        return Ok(());
    };

    let radios = driver.find_all(By::XPath("//input[@type='radio']")).await?;
    let Some(radio) = radios.get(index) else {
        return Err(StageError::TransientUi {
            description: "gender radio group".to_string(),
            waited_ms: 0,
        });
    };

    // The framework hides the native input under a styled label, which
    // refuses plain clicks.
    if radio.click().await.is_err() {
        driver
            .execute("arguments[0].click();", vec![radio.to_json()?])
            .await?;
    }
    settle(Duration::from_secs(1)).await;
    Ok(())
}

/// Clicks a collapsible section header if present. An already-expanded
/// section renders no control; that is not a failure.
async fn expand_section(driver: &WebDriver, chain: &[Locator], description: &str) {
    if let Ok(control) = find_first(driver, chain, Duration::from_secs(2), description).await {
        if control.click().await.is_ok() {
            tracing::debug!("{} expanded", description);
            settle(Duration::from_secs(1)).await;
        }
    }
}
