use serde::{Deserialize, Serialize};

use super::ContextMap;
use crate::error::ControllerError;

/// Logical paths of the snapshot files of one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotRef {
    #[serde(default)]
    pub document_data_file_path: String,
    #[serde(default)]
    pub context_data_file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_data_file_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordData {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub snapshot: SnapshotRef,
}

/// Selects which stages of a pipeline config an executor runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessorFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl ProcessorFilter {
    pub fn include(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            includes: names.into_iter().map(Into::into).collect(),
            excludes: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if !self.includes.is_empty() && !self.excludes.is_empty() {
            return Err(ControllerError::InvalidFilter);
        }
        Ok(())
    }

    pub fn allows(&self, stage_name: &str) -> bool {
        if !self.includes.is_empty() {
            return self.includes.iter().any(|n| n == stage_name);
        }
        !self.excludes.iter().any(|n| n == stage_name)
    }
}

/// Envelope handed to an executor: where the pipeline config lives, which
/// stages to run, and where the input snapshots are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerRequest {
    #[serde(default)]
    pub dpp_version: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_config_file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_filter: Option<ProcessorFilter>,
    /// Seed context used when there are no records yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextMap>,
    #[serde(default)]
    pub snapshot_dir_root_path: String,
    #[serde(default)]
    pub records: Vec<RecordData>,
}

/// Same shape as the request; records point at the output snapshots.
pub type ControllerResponse = ControllerRequest;

/// Body returned by the HTTP executor endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteEnvelope {
    pub code: u16,
    pub message: String,
    pub timestamp: String,
    pub elapsed_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ControllerResponse>,
}

impl ExecuteEnvelope {
    pub fn success(response: ControllerResponse, elapsed_time_ms: u64) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed_time_ms,
            response: Some(response),
        }
    }

    pub fn failure(code: u16, message: impl Into<String>, elapsed_time_ms: u64) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed_time_ms,
            response: None,
        }
    }
}
