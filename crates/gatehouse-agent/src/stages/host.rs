//! Host association: typing a truncated host name into the search box,
//! triggering the person-name search, and selecting the best match.
//!
//! Only the first three name tokens are typed; the console's search
//! chokes on very long queries and three tokens are enough to rank the
//! right resident first.

use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_first, key, settle, type_slowly, Locator};
use crate::overlay::{click_guarded, sweep};

const TYPE_DELAY: Duration = Duration::from_millis(100);

const SEARCH_FIELD: &[Locator] = &[
    Locator::Css("input[placeholder='Pesquisar']"),
    Locator::XPath("//input[contains(@placeholder, 'esquisar')]"),
];

const SEARCH_BY_NAME_OPTION: &[Locator] = &[Locator::XPath(
    "//li[contains(@class, 'el-autocomplete-suggestion__item')]//label[text()='Pesquisar por nome da pessoa']",
)];

const RESULT_TITLES: &str =
    "//ul[contains(@class, 'person-search')]//div[contains(@class, 'name-title')]";

/// First three whitespace tokens of the host name.
pub fn search_tokens(host_name: &str) -> String {
    host_name
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Index of the result to select: an exact case-insensitive match if one
/// exists, otherwise the first result.
pub fn pick_match(candidates: &[String], query: &str) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    let query = query.trim().to_lowercase();
    candidates
        .iter()
        .position(|c| c.trim().to_lowercase() == query)
        .or(Some(0))
}

pub async fn associate(driver: &WebDriver, host_name: &str) -> Result<(), StageError> {
    let query = search_tokens(host_name);
    tracing::info!("Searching host '{}'", query);

    let field = find_first(driver, SEARCH_FIELD, Duration::from_secs(5), "host search box").await?;
    click_guarded(driver, &field, "host search box").await?;
    field.clear().await?;
    type_slowly(&field, &query, TYPE_DELAY).await?;

    // Give the debounced autocomplete a moment to produce suggestions.
    settle(Duration::from_secs(2)).await;

    match find_first(
        driver,
        SEARCH_BY_NAME_OPTION,
        Duration::from_secs(5),
        "search-by-name option",
    )
    .await
    {
        Ok(option) => {
            option.click().await?;
        }
        Err(_) => {
            // The suggestion list did not render; Enter runs the same search.
            field.send_keys(key(Key::Enter)).await?;
        }
    }
    settle(Duration::from_secs(3)).await;

    select_result(driver, &query).await?;
    sweep(driver).await;

    Ok(())
}

async fn select_result(driver: &WebDriver, query: &str) -> Result<(), StageError> {
    let titles = driver.find_all(By::XPath(RESULT_TITLES)).await?;

    let mut texts = Vec::with_capacity(titles.len());
    for title in &titles {
        texts.push(title.text().await.unwrap_or_default());
    }

    let Some(index) = pick_match(&texts, query) else {
        return Err(StageError::TransientUi {
            description: format!("host search result for '{}'", query),
            waited_ms: 0,
        });
    };

    let chosen = &titles[index];
    tracing::info!("Selecting host result '{}'", texts[index].trim());

    // The clickable surface is the surrounding result card, not the title.
    let card = chosen
        .find(By::XPath(
            "./ancestor::li[contains(@class, 'person-info-search-item-template')]",
        ))
        .await;

    match card {
        Ok(card) => {
            driver
                .execute("arguments[0].click();", vec![card.to_json()?])
                .await?;
        }
        Err(_) => {
            chosen.click().await?;
        }
    }
    settle(Duration::from_secs(2)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_tokens_truncates_to_three() {
        assert_eq!(
            search_tokens("Lucca Lacerda Pereira de Souza"),
            "Lucca Lacerda Pereira"
        );
    }

    #[test]
    fn test_search_tokens_short_names_untouched() {
        assert_eq!(search_tokens("Lucca Lacerda"), "Lucca Lacerda");
        assert_eq!(search_tokens("Lucca"), "Lucca");
    }

    #[test]
    fn test_pick_match_prefers_exact_case_insensitive() {
        let candidates = vec![
            "LUCCA LACERDA JUNIOR".to_string(),
            "LUCCA LACERDA".to_string(),
        ];
        assert_eq!(pick_match(&candidates, "Lucca Lacerda"), Some(1));
    }

    #[test]
    fn test_pick_match_falls_back_to_first() {
        let candidates = vec![
            "LUCCA LACERDA JUNIOR".to_string(),
            "LUCCA LACERDA NETO".to_string(),
        ];
        assert_eq!(pick_match(&candidates, "Lucca Lacerda"), Some(0));
    }

    #[test]
    fn test_pick_match_empty_results() {
        assert_eq!(pick_match(&[], "anyone"), None);
    }

    #[test]
    fn test_pick_match_trims_rendered_whitespace() {
        let candidates = vec!["  lucca lacerda  ".to_string()];
        assert_eq!(pick_match(&candidates, "LUCCA LACERDA"), Some(0));
    }
}
