//! Configuration loading and validation.
//!
//! The config file is JSON, validated against an embedded JSON Schema and
//! then semantically. Credential fields accept `env:VAR` references so the
//! file itself stays secret-free.

pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{Config, ConsoleConfig, ExecutorConfig, QueueConfig};

use crate::error::ConfigError;

/// Resolves a possibly-indirect secret value.
///
/// `env:VAR` reads the environment variable `VAR`; anything else is
/// returned verbatim.
pub fn resolve_secret(value: &str) -> Result<String, ConfigError> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).map_err(|e| ConfigError::UnresolvedSecret {
            reference: value.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_literal_value_passes_through() {
        assert_eq!(resolve_secret("plaintext").unwrap(), "plaintext");
    }

    #[test]
    #[serial]
    fn test_env_reference_resolves() {
        std::env::set_var("GATEHOUSE_TEST_SECRET", "s3cret");
        assert_eq!(resolve_secret("env:GATEHOUSE_TEST_SECRET").unwrap(), "s3cret");
        std::env::remove_var("GATEHOUSE_TEST_SECRET");
    }

    #[test]
    #[serial]
    fn test_missing_env_reference_errors() {
        std::env::remove_var("GATEHOUSE_TEST_MISSING");
        let err = resolve_secret("env:GATEHOUSE_TEST_MISSING").unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedSecret { .. }));
    }
}
