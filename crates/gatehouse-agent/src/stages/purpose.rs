//! Visit purpose and visitor group dropdowns.

use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_first, settle, Locator};
use crate::overlay::{click_guarded, sweep};

const PURPOSE_TRIGGER: &[Locator] = &[
    Locator::Css("input[title='Business']"),
    Locator::XPath("//label[contains(text(), 'Objetivo')]/following-sibling::*//input"),
];

const PURPOSE_OPTION: &[Locator] = &[
    Locator::XPath(
        "//li[contains(@class, 'el-select-dropdown__item')]//span[text()=' Fazer passeio e visita ']",
    ),
    Locator::XPath(
        "//li[contains(@class, 'el-select-dropdown__item')]//span[contains(text(), 'Fazer passeio')]",
    ),
];

const GROUP_TRIGGER: &[Locator] = &[
    Locator::Css("input[title='Corretores']"),
    Locator::XPath("//label[contains(text(), 'Grupo')]/following-sibling::*//input"),
];

const GROUP_OPTION: &[Locator] = &[
    Locator::XPath(
        "//li[contains(@class, 'el-select-dropdown__item')]//span[text()=' VisitanteS ']",
    ),
    Locator::XPath(
        "//li[contains(@class, 'el-select-dropdown__item')]//span[contains(text(), 'VisitanteS')]",
    ),
];

pub async fn select_purpose_and_group(driver: &WebDriver) -> Result<(), StageError> {
    select(driver, PURPOSE_TRIGGER, PURPOSE_OPTION, "visit purpose").await?;
    select(driver, GROUP_TRIGGER, GROUP_OPTION, "visitor group").await?;
    tracing::info!("Purpose and group selected");
    Ok(())
}

async fn select(
    driver: &WebDriver,
    trigger: &[Locator],
    option: &[Locator],
    description: &str,
) -> Result<(), StageError> {
    sweep(driver).await;

    let trigger_el = find_first(driver, trigger, Duration::from_secs(5), description).await?;
    click_guarded(driver, &trigger_el, description).await?;
    settle(Duration::from_secs(1)).await;

    let option_el = find_first(
        driver,
        option,
        Duration::from_secs(5),
        &format!("{} option", description),
    )
    .await?;
    option_el.click().await?;
    settle(Duration::from_secs(1)).await;

    Ok(())
}
