use std::path::Path;

use crate::config::schema::{Config, OutputConfig};
use crate::error::ConfigError;
use crate::secrets::has_secret_source;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

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

/// Checks shape, types, ranges, and unknown keys against the embedded schema.
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

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    match &config.output {
        OutputConfig::PerItem { extension } => {
            if config
                .input_extensions
                .iter()
                .any(|ext| ext.eq_ignore_ascii_case(extension))
            {
                return Err(invalid(format!(
                    "Output extension '{}' collides with an input extension",
                    extension
                )));
            }
        }
        OutputConfig::Singleton { .. } => {
            if !config.archive_processed {
                return Err(invalid(
                    "Singleton output mode requires archive_processed: true",
                ));
            }
        }
    }

    if !has_secret_source(
        config.gpg.passphrase.as_deref(),
        config.gpg.passphrase_file.as_deref(),
        config.gpg.passphrase_env_var.as_deref(),
    ) {
        return Err(invalid(
            "gpg needs one of passphrase, passphrase_file or passphrase_env_var",
        ));
    }

    Ok(())
}
