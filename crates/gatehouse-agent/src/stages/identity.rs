//! The identity section: given name and surname, split from the payload's
//! full name.

use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_first, find_nth, settle, type_slowly, Locator};
use crate::overlay::sweep;

const TYPE_DELAY: Duration = Duration::from_millis(80);

const GIVEN_NAME_FIELD: &[Locator] = &[
    Locator::Css("input[maxlength='255']"),
    Locator::Css("input.el-input__inner"),
    Locator::Css("input[type='text']"),
];

/// Splits a full name into (given name, surname).
pub fn split_name(full_name: &str) -> (String, String) {
    let mut tokens = full_name.split_whitespace();
    let given = tokens.next().unwrap_or("").to_string();
    let surname = tokens.collect::<Vec<_>>().join(" ");
    (given, surname)
}

pub async fn fill(driver: &WebDriver, full_name: &str) -> Result<(), StageError> {
    let (given, surname) = split_name(full_name);

    sweep(driver).await;

    let given_field =
        find_first(driver, GIVEN_NAME_FIELD, Duration::from_secs(5), "given name field").await?;
    given_field.scroll_into_view().await?;
    given_field.click().await?;
    given_field.clear().await?;
    type_slowly(&given_field, &given, TYPE_DELAY).await?;
    settle(Duration::from_secs(1)).await;

    sweep(driver).await;

    if !surname.is_empty() {
        let surname_field = surname_field(driver).await?;
        surname_field.clear().await?;
        type_slowly(&surname_field, &surname, TYPE_DELAY).await?;
        settle(Duration::from_secs(1)).await;
    }

    sweep(driver).await;
    tracing::info!("Identity section filled");
    Ok(())
}

/// The surname field carries a stable id on current builds; older builds
/// only expose it as the second text input.
async fn surname_field(driver: &WebDriver) -> Result<WebElement, StageError> {
    if let Ok(field) = driver.find(By::Css("input#myDiv")).await {
        return Ok(field);
    }
    if let Ok(field) = find_nth(driver, By::Css("input[maxlength='255']"), 1, "surname field").await
    {
        return Ok(field);
    }
    find_nth(driver, By::Css("input[type='text']"), 1, "surname field").await
}
