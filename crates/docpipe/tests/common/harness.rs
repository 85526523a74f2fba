//! Isolated storage root plus the capabilities a run needs.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use docpipe::{
    FileSystem, LocalFileSystem, LogHandle, Orchestrator, PipelineConfig, ProcessorRegistry,
    RunContext,
};

pub struct TestHarness {
    temp_dir: TempDir,
    pub storage: Arc<LocalFileSystem>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = Arc::new(LocalFileSystem::new(temp_dir.path()));
        Self { temp_dir, storage }
    }

    /// OS path of the storage root.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn run_context(&self) -> RunContext {
        RunContext::new(self.storage.clone(), LogHandle::new())
    }

    pub fn write_text(&self, logical: &str, content: &str) {
        self.storage
            .write(logical, content.as_bytes())
            .expect("Failed to write input file");
    }

    pub fn create_dir(&self, logical: &str) {
        self.storage
            .create_folders(logical)
            .expect("Failed to create directory");
    }

    pub fn write_config(&self, logical: &str, config: &PipelineConfig) {
        let json = serde_json::to_string_pretty(config).expect("Failed to serialize config");
        self.write_text(logical, &json);
    }

    pub fn exists(&self, logical: &str) -> bool {
        self.storage.exists(logical).expect("Failed to check path")
    }

    pub fn list(&self, logical: &str) -> Vec<String> {
        self.storage.list(logical).unwrap_or_default()
    }

    pub fn read_json(&self, logical: &str) -> Value {
        let text = self
            .storage
            .read_to_string(logical)
            .expect("Failed to read file");
        serde_json::from_str(&text).expect("File is not valid JSON")
    }

    pub fn orchestrator(&self, config: PipelineConfig, registry: &ProcessorRegistry) -> Orchestrator {
        Orchestrator::new(config, registry, self.run_context()).expect("Failed to build orchestrator")
    }
}
