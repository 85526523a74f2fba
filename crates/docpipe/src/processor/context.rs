use std::sync::Arc;

use crate::logging::LogHandle;
use crate::storage::FileSystem;

/// Capabilities injected into the orchestrator and into every stage call.
///
/// Built once per run; the orchestrator derives a per-stage copy so that log
/// lines carry the stage name.
#[derive(Clone)]
pub struct RunContext {
    pub storage: Arc<dyn FileSystem>,
    pub log: LogHandle,
    pub run_id: String,
    pub stage_name: Option<String>,
}

impl RunContext {
    pub fn new(storage: Arc<dyn FileSystem>, log: LogHandle) -> Self {
        Self {
            storage,
            log,
            run_id: String::new(),
            stage_name: None,
        }
    }

    pub fn for_run(&self, run_id: &str) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            log: self.log.for_run(run_id),
            run_id: run_id.to_string(),
            stage_name: None,
        }
    }

    pub fn for_stage(&self, stage_name: &str) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            log: self.log.for_stage(stage_name),
            run_id: self.run_id.clone(),
            stage_name: Some(stage_name.to_string()),
        }
    }

    pub fn storage(&self) -> &dyn FileSystem {
        self.storage.as_ref()
    }

    /// Key a stage writes its output under: its configured name, or
    /// `fallback` when called outside an orchestrated run.
    pub fn context_key<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.stage_name.as_deref().unwrap_or(fallback)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(
            Arc::new(crate::storage::LocalFileSystem::new(std::env::temp_dir())),
            LogHandle::new(),
        )
    }
}
