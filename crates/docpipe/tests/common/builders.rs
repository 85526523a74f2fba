//! Builder for pipeline configs used across integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use docpipe::config::{
    DeploymentConfig, HttpSpec, OrchestratorSettings, PipelineConfig, StageConfig, SubprocessSpec,
    TransportSpec,
};

pub const TEST_WORK_ROOT: &str = "/work";

pub struct PipelineBuilder {
    stages: Vec<StageConfig>,
    variables: Map<String, Value>,
    orchestrator: OrchestratorSettings,
    deployment: BTreeMap<String, TransportSpec>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            variables: Map::new(),
            orchestrator: OrchestratorSettings {
                work_root: TEST_WORK_ROOT.to_string(),
                ..OrchestratorSettings::default()
            },
            deployment: BTreeMap::new(),
        }
    }

    pub fn stage(self, name: &str) -> Self {
        self.stage_with(name, Value::Null)
    }

    pub fn stage_with(mut self, name: &str, config: Value) -> Self {
        self.stages.push(StageConfig::new(name, true, config));
        self
    }

    pub fn disabled_stage(mut self, name: &str) -> Self {
        self.stages.push(StageConfig::new(name, false, Value::Null));
        self
    }

    pub fn variable(mut self, name: &str, value: &str) -> Self {
        self.variables
            .insert(name.to_string(), Value::String(value.to_string()));
        self
    }

    pub fn parallelism(mut self, workers: usize) -> Self {
        self.orchestrator.parallelism = workers;
        self
    }

    pub fn snapshot_in_process(mut self) -> Self {
        self.orchestrator.snapshot_in_process = true;
        self
    }

    pub fn subprocess(mut self, stage: &str, spec: SubprocessSpec) -> Self {
        self.deployment
            .insert(stage.to_string(), TransportSpec::Subprocess(spec));
        self
    }

    pub fn http(mut self, stage: &str, url: &str, timeout_secs: u64) -> Self {
        self.deployment.insert(
            stage.to_string(),
            TransportSpec::Http(HttpSpec {
                url: url.to_string(),
                headers: BTreeMap::new(),
                timeout_secs,
            }),
        );
        self
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig {
            name: Some("test-pipeline".to_string()),
            variables: self.variables,
            processor_list: self.stages,
            orchestrator: self.orchestrator,
            deployment: DeploymentConfig {
                processors: self.deployment,
            },
        }
    }
}

/// Subprocess spec running `script` through `/bin/sh` with the request path
/// as `$1`.
pub fn shell_executor(script: &str, timeout_secs: Option<u64>) -> SubprocessSpec {
    SubprocessSpec {
        command: "/bin/sh".to_string(),
        args: vec![
            "-c".to_string(),
            script.to_string(),
            "executor".to_string(),
            "${SYS_CONTROLLER_REQ_FILE_PATH}".to_string(),
        ],
        env: BTreeMap::new(),
        working_dir: None,
        timeout_secs,
    }
}
