pub mod loader;
pub mod schema;
pub mod variables;

pub use loader::{
    load_pipeline_config, load_pipeline_config_from_str, load_pipeline_config_from_value,
};
pub use schema::{
    DeploymentConfig, HttpSpec, OrchestratorSettings, PipelineConfig, StageConfig,
    SubprocessSpec, TransportSpec, DEFAULT_WORK_ROOT,
};
pub use variables::VariableEngine;
