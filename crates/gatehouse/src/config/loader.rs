use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| format!("{} at {}", e, e.instance_path()))
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.queue.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "queue.worker_count must be at least 1".to_string(),
        });
    }

    if config.executor.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "executor.timeout_secs must be at least 1".to_string(),
        });
    }

    if config.console.url.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "console.url must not be empty".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "version": "1.0",
        "console": {
            "url": "http://10.0.0.5:8090",
            "username": "admin",
            "password": "env:CONSOLE_PASSWORD"
        }
    }"#;

    #[test]
    fn test_load_valid_config() {
        let config = load_config_from_str(VALID).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.console.url, "http://10.0.0.5:8090");
    }

    #[test]
    fn test_rejects_unknown_top_level_key() {
        let bad = r#"{
            "version": "1.0",
            "bogus": true,
            "console": { "url": "x", "username": "u", "password": "p" }
        }"#;
        let err = load_config_from_str(bad).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_rejects_missing_console() {
        let err = load_config_from_str(r#"{"version": "1.0"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let bad = r#"{
            "version": "9.9",
            "console": { "url": "x", "username": "u", "password": "p" }
        }"#;
        let err = load_config_from_str(bad).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let bad = r#"{
            "version": "1.0",
            "queue": { "worker_count": 0 },
            "console": { "url": "x", "username": "u", "password": "p" }
        }"#;
        // Caught by the schema minimum before the semantic check.
        assert!(load_config_from_str(bad).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, VALID).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.console.username, "admin");
    }

    #[test]
    fn test_missing_file_error_carries_path() {
        let err = load_config("/nonexistent/config.json").unwrap_err();
        match err {
            ConfigError::ReadFile { path, .. } => {
                assert!(path.to_string_lossy().contains("config.json"));
            }
            other => panic!("Expected ReadFile error, got {other:?}"),
        }
    }
}
