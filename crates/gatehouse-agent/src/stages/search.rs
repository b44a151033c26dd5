//! Reactivation-only stages: locating an existing visitor record by
//! identity document and opening the renew action on it.

use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_first, settle, type_slowly, Locator};
use crate::overlay::{click_guarded, sweep};

const TYPE_DELAY: Duration = Duration::from_millis(80);

const FILTER_TOGGLE: &[Locator] = &[
    Locator::Css("button i.icomoon-common_btn_filter"),
    Locator::XPath("//i[contains(@class, 'btn_filter')]/parent::button"),
];

const FILTER_INPUT: &[Locator] = &[
    Locator::Css(".el-table-filter input.el-input__inner"),
    Locator::Css("input.el-input__inner[placeholder='']"),
];

const FILTER_RUN: &[Locator] = &[
    Locator::XPath("//button[@title='Filtro']//span[text()='Filtro']"),
    Locator::XPath("//button//span[text()='Filtro']"),
];

const RENEW_BUTTON: &[Locator] = &[
    Locator::Css("button[title='Reservar novamente']"),
    Locator::XPath("//button[@title='Reservar novamente']"),
];

/// Detection strategies for a non-empty result set, tried in order.
const RESULT_PROBES: &[Locator] = &[
    Locator::Css("tr[data-row-key]"),
    Locator::Css("tbody tr:not(.el-table__empty-row)"),
    Locator::Css("button[title='Reservar novamente']"),
];

/// Filters the visitor list by identity document and verifies a record
/// came back.
pub async fn find_by_document(driver: &WebDriver, document: &str) -> Result<(), StageError> {
    tracing::info!("Searching visitor records by document");

    let toggle = find_first(driver, FILTER_TOGGLE, Duration::from_secs(5), "filter toggle").await?;
    click_guarded(driver, &toggle, "filter toggle").await?;
    settle(Duration::from_secs(1)).await;

    let input = find_first(driver, FILTER_INPUT, Duration::from_secs(5), "filter input").await?;
    input.clear().await?;
    type_slowly(&input, document, TYPE_DELAY).await?;
    settle(Duration::from_millis(500)).await;

    let run = find_first(driver, FILTER_RUN, Duration::from_secs(5), "filter run button").await?;
    click_guarded(driver, &run, "filter run button").await?;

    // Let the table re-query before probing for rows.
    settle(Duration::from_secs(3)).await;

    for (index, probe) in RESULT_PROBES.iter().enumerate() {
        if let Ok(matches) = driver.find_all(probe.by()).await {
            if !matches.is_empty() {
                tracing::info!(
                    "Record found (probe {} matched {} element(s))",
                    index + 1,
                    matches.len()
                );
                return Ok(());
            }
        }
    }

    Err(StageError::TransientUi {
        description: format!("visitor record for document '{}'", document),
        waited_ms: 3000,
    })
}

/// Opens the renew action on the located record.
pub async fn open_renewal(driver: &WebDriver) -> Result<(), StageError> {
    let renew = find_first(driver, RENEW_BUTTON, Duration::from_secs(5), "renew button").await?;
    renew.scroll_into_view().await?;
    click_guarded(driver, &renew, "renew button").await?;
    settle(Duration::from_secs(3)).await;
    sweep(driver).await;

    tracing::info!("Renew dialog open");
    Ok(())
}
