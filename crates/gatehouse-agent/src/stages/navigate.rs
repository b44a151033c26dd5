//! Menu traversal to the entry form (create) or the visitor-information
//! list (reactivate). Each hop tries an ordered locator chain; the menus
//! re-render with timing jitter, so every hop gets its own bounded wait.

use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_first, settle, Locator};
use crate::overlay::{click_guarded, sweep};

const HOP_WAIT: Duration = Duration::from_secs(5);

const ENTRY_STEP: &[Locator] = &[
    Locator::XPath("//div[@title='Entrada de visitante' and contains(@class, 'guide-step-name')]"),
    Locator::XPath("//div[contains(@title, 'Entrada de visitante')]"),
    Locator::XPath("//span[contains(text(), 'Entrada de visitante')]"),
];

const UNRESERVED_ENTRY: &[Locator] = &[
    Locator::XPath("//button[@title='Entrada de visitante não reservada']"),
    Locator::XPath("//button[contains(@title, 'não reservada')]"),
];

const SIDEBAR_ENTRY: &[Locator] = &[
    Locator::XPath("//span[@id='subMenuTitle4' and contains(text(), 'Entrada de visitante')]"),
    Locator::XPath(
        "//span[contains(@class, 'el-submenu__title--text')]//span[contains(text(), 'Entrada de visitante')]",
    ),
    Locator::XPath("//span[contains(text(), 'Entrada de visitante')]"),
];

const VISITOR_INFO: &[Locator] = &[
    Locator::XPath(
        "//span[contains(@class, 'el-menu-item--text') and contains(text(), 'Informação de visitante')]",
    ),
    Locator::XPath("//span[contains(text(), 'Informação de visitante')]"),
];

const VISITOR_GROUP_NODE: &[Locator] = &[
    Locator::XPath("//span[contains(@class, 'node_name') and contains(text(), 'VisitanteS')]"),
    Locator::XPath("//span[contains(text(), 'VisitanteS')]"),
];

/// Opens the unreserved-entry form for a fresh registration.
pub async fn to_entry_form(driver: &WebDriver) -> Result<(), StageError> {
    open_visitor_menu(driver).await?;

    let entry = find_first(driver, ENTRY_STEP, HOP_WAIT, "visitor entry step").await?;
    click_guarded(driver, &entry, "visitor entry step").await?;
    settle(Duration::from_secs(2)).await;

    hide_tour_tooltip(driver).await;

    let unreserved =
        find_first(driver, UNRESERVED_ENTRY, HOP_WAIT, "unreserved entry button").await?;
    click_guarded(driver, &unreserved, "unreserved entry button").await?;
    settle(Duration::from_secs(2)).await;

    tracing::info!("Entry form open");
    Ok(())
}

/// Opens the visitor-information list for reactivation.
pub async fn to_visitor_info(driver: &WebDriver) -> Result<(), StageError> {
    open_visitor_menu(driver).await?;

    let entry = find_first(driver, SIDEBAR_ENTRY, HOP_WAIT, "sidebar entry submenu").await?;
    entry.scroll_into_view().await?;
    click_guarded(driver, &entry, "sidebar entry submenu").await?;
    settle(Duration::from_secs(2)).await;

    let info = find_first(driver, VISITOR_INFO, HOP_WAIT, "visitor information item").await?;
    info.scroll_into_view().await?;
    click_guarded(driver, &info, "visitor information item").await?;
    settle(Duration::from_secs(2)).await;

    let group = find_first(driver, VISITOR_GROUP_NODE, HOP_WAIT, "visitor group node").await?;
    group.scroll_into_view().await?;
    click_guarded(driver, &group, "visitor group node").await?;
    settle(Duration::from_secs(2)).await;

    tracing::info!("Visitor information list open");
    Ok(())
}

/// The "Visitante" top-level menu appears twice in the page; the second
/// occurrence is the clickable menu entry.
async fn open_visitor_menu(driver: &WebDriver) -> Result<(), StageError> {
    let candidates = driver
        .find_all(By::XPath("//*[contains(text(), 'Visitante')]"))
        .await?;

    let mut target = None;
    if candidates.len() >= 2 {
        target = Some(candidates[1].clone());
    } else if let Some(first) = candidates.into_iter().next() {
        target = Some(first);
    }

    let Some(menu) = target else {
        return Err(StageError::TransientUi {
            description: "'Visitante' menu entry".to_string(),
            waited_ms: 0,
        });
    };

    // The menu entry sometimes refuses a plain click; fall back to a
    // scripted one before giving up.
    if menu.click().await.is_err() {
        driver
            .execute("arguments[0].click();", vec![menu.to_json()?])
            .await?;
    }
    settle(Duration::from_secs(3)).await;
    sweep(driver).await;
    Ok(())
}

/// The first visit shows a guided-tour tooltip on top of the entry
/// buttons. Hiding a tooltip that is not there is not an error.
async fn hide_tour_tooltip(driver: &WebDriver) {
    if let Ok(tooltip) = driver.find(By::Id("visitorTips1")).await {
        if tooltip.is_displayed().await.unwrap_or(false) {
            let hidden = driver
                .execute(
                    "arguments[0].style.display = 'none';",
                    vec![tooltip.to_json().unwrap_or(serde_json::Value::Null)],
                )
                .await;
            if hidden.is_ok() {
                tracing::debug!("Guided-tour tooltip hidden");
            }
        }
    }
}
