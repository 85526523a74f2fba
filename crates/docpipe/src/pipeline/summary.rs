use std::collections::BTreeMap;

use serde::Serialize;

/// Snapshot files written around one stage invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageFiles {
    pub request_file: Option<String>,
    pub response_file: Option<String>,
}

/// Audit record of the last `run_batch` call. Never consulted by the
/// pipeline itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunBatchSummary {
    pub run_id: String,
    /// Enabled stages that were invoked, in execution order.
    pub stage_names: Vec<String>,
    pub stage_files: BTreeMap<String, StageFiles>,
    pub document_count: usize,
    pub halted_count: usize,
    pub elapsed_ms: u64,
}

impl RunBatchSummary {
    pub fn files_for(&self, stage_name: &str) -> Option<&StageFiles> {
        self.stage_files.get(stage_name)
    }
}
