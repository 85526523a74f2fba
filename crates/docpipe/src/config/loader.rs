use std::collections::HashSet;

use serde_json::Value;

use crate::config::schema::{PipelineConfig, TransportSpec};
use crate::config::variables::VariableEngine;
use crate::error::ConfigError;
use crate::storage::FileSystem;

const SCHEMA_JSON: &str = include_str!("../../schema/pipeline-v1.json");

/// Reads, validates and interpolates a pipeline config from storage.
pub fn load_pipeline_config(fs: &dyn FileSystem, path: &str) -> Result<PipelineConfig, ConfigError> {
    let content = fs.read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_string(),
        source: e,
    })?;

    load_pipeline_config_from_str(&content)
}

pub fn load_pipeline_config_from_str(content: &str) -> Result<PipelineConfig, ConfigError> {
    let json_value: Value = serde_json::from_str(content)?;
    load_pipeline_config_from_value(json_value)
}

pub fn load_pipeline_config_from_value(mut json_value: Value) -> Result<PipelineConfig, ConfigError> {
    validate_schema(&json_value)?;

    let variables = json_value
        .get("variables")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    VariableEngine::new(&variables).interpolate_document(&mut json_value);

    let config: PipelineConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &Value) -> Result<(), ConfigError> {
    let schema: Value = serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
        message: format!("Invalid embedded schema JSON: {}", e),
    })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for stage in &config.processor_list {
        if stage.name.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "Stage name must not be empty".to_string(),
            });
        }
        if !names.insert(stage.name.as_str()) {
            return Err(ConfigError::DuplicateStage {
                name: stage.name.clone(),
            });
        }
        if !(stage.config.is_null() || stage.config.is_object()) {
            return Err(ConfigError::Validation {
                message: format!("Config of stage '{}' must be an object", stage.name),
            });
        }
    }

    for (name, transport) in &config.deployment.processors {
        match transport {
            TransportSpec::InProcess => {}
            TransportSpec::Subprocess(spec) => {
                if spec.command.trim().is_empty() {
                    return Err(ConfigError::InvalidTransport {
                        name: name.clone(),
                        reason: "subprocess command must not be empty".to_string(),
                    });
                }
            }
            TransportSpec::Http(spec) => {
                if !(spec.url.starts_with("http://") || spec.url.starts_with("https://")) {
                    return Err(ConfigError::InvalidTransport {
                        name: name.clone(),
                        reason: format!("'{}' is not an http(s) URL", spec.url),
                    });
                }
            }
        }
    }

    Ok(())
}
