use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_WORK_ROOT: &str = "/data/temp/work/docpipe";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub processor_list: Vec<StageConfig>,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub deployment: DeploymentConfig,
}

impl PipelineConfig {
    pub fn enabled_stages(&self) -> impl Iterator<Item = &StageConfig> {
        self.processor_list.iter().filter(|stage| stage.enabled)
    }

    /// How the named stage is executed. Stages without a deployment entry
    /// run in-process.
    pub fn transport_for(&self, stage_name: &str) -> TransportSpec {
        self.deployment
            .processors
            .get(stage_name)
            .cloned()
            .unwrap_or(TransportSpec::InProcess)
    }
}

/// One entry of `processor_list`, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Settings passed verbatim to the stage.
    #[serde(default)]
    pub config: Value,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, enabled: bool, config: Value) -> Self {
        Self {
            name: name.into(),
            enabled,
            config,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_work_root")]
    pub work_root: String,
    /// Bracket in-process stages with request/response snapshots too.
    #[serde(default)]
    pub snapshot_in_process: bool,
    /// Upper bound on documents processed concurrently by one stage.
    /// `0` means one worker per CPU.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl OrchestratorSettings {
    pub fn worker_count(&self) -> usize {
        match self.parallelism {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}

fn default_work_root() -> String {
    DEFAULT_WORK_ROOT.to_string()
}

fn default_parallelism() -> usize {
    1
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            snapshot_in_process: false,
            parallelism: default_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub processors: BTreeMap<String, TransportSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransportSpec {
    InProcess,
    Subprocess(SubprocessSpec),
    Http(HttpSpec),
}

impl TransportSpec {
    pub fn is_external(&self) -> bool {
        !matches!(self, TransportSpec::InProcess)
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            TransportSpec::InProcess => "in_process",
            TransportSpec::Subprocess(_) => "subprocess",
            TransportSpec::Http(_) => "http",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubprocessSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl SubprocessSpec {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSpec {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl HttpSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
