//! Login. Failure here is immediately fatal for the run: bad credentials
//! or an unreachable console do not improve with in-stage retries.

use std::time::Duration;

use thirtyfour::prelude::*;

use crate::error::StageError;
use crate::locator::{find_first, settle, type_slowly, Locator};
use crate::session::AgentEnv;

const TYPE_DELAY: Duration = Duration::from_millis(100);

const USERNAME_FIELD: &[Locator] = &[
    Locator::Css("input#username"),
    Locator::Css("input[id='username']"),
];

const PASSWORD_FIELD: &[Locator] = &[
    Locator::Css("input#password"),
    Locator::Css("input[id='password']"),
];

const LOGIN_BUTTON: &[Locator] = &[
    Locator::Css(".login-btn"),
    Locator::XPath("//button[contains(@class, 'login')]"),
];

pub async fn login(driver: &WebDriver, env: &AgentEnv) -> Result<(), StageError> {
    // The landing page takes a while to render its login form.
    settle(Duration::from_secs(5)).await;

    let result = submit_credentials(driver, env).await;
    result.map_err(|e| match e {
        auth @ StageError::Authentication(_) => auth,
        other => StageError::Authentication(other.to_string()),
    })
}

async fn submit_credentials(driver: &WebDriver, env: &AgentEnv) -> Result<(), StageError> {
    let username = find_first(driver, USERNAME_FIELD, Duration::from_secs(10), "username field")
        .await?;
    username.clear().await?;
    type_slowly(&username, &env.username, TYPE_DELAY).await?;
    settle(Duration::from_secs(1)).await;

    let password = find_first(driver, PASSWORD_FIELD, Duration::from_secs(5), "password field")
        .await?;
    password.clear().await?;
    type_slowly(&password, &env.password, TYPE_DELAY).await?;
    settle(Duration::from_secs(1)).await;

    let button = find_first(driver, LOGIN_BUTTON, Duration::from_secs(5), "login button").await?;
    button.click().await?;

    // Let the main page load before the caller starts navigating.
    settle(Duration::from_secs(4)).await;

    // If the login form is still up, the credentials were rejected.
    if let Ok(field) = driver.find(By::Css("input#username")).await {
        if field.is_displayed().await.unwrap_or(false) {
            return Err(StageError::Authentication(
                "console rejected the credentials".to_string(),
            ));
        }
    }

    tracing::info!("Authenticated against the console");
    Ok(())
}
