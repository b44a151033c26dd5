//! Visit-duration configuration.
//!
//! Policy: a requested validity of one day (or none) leaves the field
//! untouched, since the console already defaults to one day. For N > 1 days the
//! embedded base date is read from the field and rewritten as
//! `base + N days` at end-of-day. The widget resists naive clearing, so
//! the field is emptied through a sequence of strategies before the new
//! value is typed character by character.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_first, key, settle, type_slowly, Locator};
use crate::overlay::{click_guarded, sweep};

const TYPE_DELAY: Duration = Duration::from_millis(50);

const DATE_FIELD: &[Locator] = &[
    Locator::Css("div.el-date-editor.el-input--suffix.el-date-editor--datetime input.el-input__inner"),
    Locator::Css("input.el-input__inner[title*='23:59:59']"),
    Locator::Css("div.el-date-editor input.el-input__inner"),
];

const CLOSE_PICKER_SCRIPT: &str =
    "var el = document.elementFromPoint(window.innerWidth - 50, 200); if (el) { el.click(); }";

/// Extracts the `YYYY/MM/DD` base date embedded in the field value.
pub fn parse_base_date(value: &str) -> Option<NaiveDate> {
    let re = Regex::new(r"(\d{4})/(\d{2})/(\d{2})").ok()?;
    let caps = re.captures(value)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// The value written back: `base + days`, end of day.
pub fn extended_value(base: NaiveDate, days: u32) -> String {
    let end = base + chrono::Duration::days(i64::from(days));
    format!(
        "{:04}/{:02}/{:02} 23:59:59",
        end.year(),
        end.month(),
        end.day()
    )
}

pub async fn configure(driver: &WebDriver, validity_days: Option<u32>) -> Result<(), StageError> {
    let days = validity_days.unwrap_or(1);
    if days <= 1 {
        tracing::info!("Requested validity is {} day(s); keeping the console default", days);
        return Ok(());
    }

    let field = find_first(driver, DATE_FIELD, Duration::from_secs(5), "departure date field")
        .await?;
    field.scroll_into_view().await?;
    click_guarded(driver, &field, "departure date field").await?;
    settle(Duration::from_secs(1)).await;

    let current = match field.attr("value").await? {
        Some(value) if !value.is_empty() => value,
        _ => field.attr("title").await?.unwrap_or_default(),
    };

    let base = parse_base_date(&current).unwrap_or_else(|| chrono::Local::now().date_naive());
    let target = extended_value(base, days);
    tracing::info!(
        "Extending validity: field '{}' -> '{}' ({} days)",
        current,
        target,
        days
    );

    clear_resistant_field(driver, &field).await;

    type_slowly(&field, &target, TYPE_DELAY).await?;
    settle(Duration::from_millis(500)).await;

    close_picker(driver, &field).await;
    sweep(driver).await;

    Ok(())
}

/// Select-all + delete, then a programmatic clear, then repeated
/// backspace. Each strategy is best-effort; together they reliably leave
/// the widget empty.
async fn clear_resistant_field(driver: &WebDriver, field: &WebElement) {
    if field.send_keys(Key::Control + "a").await.is_ok() {
        settle(Duration::from_millis(300)).await;
        let _ = field.send_keys(key(Key::Backspace)).await;
        settle(Duration::from_millis(300)).await;
    }

    let _ = field.clear().await;
    if let Ok(json) = field.to_json() {
        let _ = driver.execute("arguments[0].value = '';", vec![json]).await;
    }
    settle(Duration::from_millis(200)).await;

    for _ in 0..20 {
        if field.send_keys(key(Key::Backspace)).await.is_err() {
            break;
        }
        settle(Duration::from_millis(20)).await;
    }
}

/// The date-picker overlay swallows subsequent clicks; close it by
/// clicking outside, with escape as the fallback.
async fn close_picker(driver: &WebDriver, field: &WebElement) {
    if driver.execute(CLOSE_PICKER_SCRIPT, vec![]).await.is_ok() {
        settle(Duration::from_secs(1)).await;
        return;
    }
    let _ = field.send_keys(key(Key::Escape)).await;
    settle(Duration::from_secs(1)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_date_from_full_value() {
        let base = parse_base_date("2025/09/12 23:59:59").unwrap();
        assert_eq!(base, NaiveDate::from_ymd_opt(2025, 9, 12).unwrap());
    }

    #[test]
    fn test_parse_base_date_rejects_garbage() {
        assert!(parse_base_date("").is_none());
        assert!(parse_base_date("12-09-2025").is_none());
        assert!(parse_base_date("2025/13/40 23:59:59").is_none());
    }

    #[test]
    fn test_extended_value_adds_days_at_end_of_day() {
        let base = NaiveDate::from_ymd_opt(2025, 9, 12).unwrap();
        assert_eq!(extended_value(base, 5), "2025/09/17 23:59:59");
    }

    #[test]
    fn test_extended_value_crosses_month_boundary() {
        let base = NaiveDate::from_ymd_opt(2025, 1, 30).unwrap();
        assert_eq!(extended_value(base, 3), "2025/02/02 23:59:59");
    }

    #[test]
    fn test_extended_value_crosses_year_boundary() {
        let base = NaiveDate::from_ymd_opt(2025, 12, 30).unwrap();
        assert_eq!(extended_value(base, 2), "2026/01/01 23:59:59");
    }

    #[test]
    fn test_concrete_case_from_field_to_value() {
        // Field shows 2025/09/12 23:59:59, five days requested.
        let base = parse_base_date("2025/09/12 23:59:59").unwrap();
        assert_eq!(extended_value(base, 5), "2025/09/17 23:59:59");
    }
}
