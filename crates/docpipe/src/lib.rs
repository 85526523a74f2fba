pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod snapshot;
pub mod storage;
pub mod transport;

pub use config::{load_pipeline_config, PipelineConfig, StageConfig, TransportSpec, VariableEngine};
pub use controller::{CliController, Controller, Executor, HttpController, InMemoryController};
pub use data::{
    ContextMap, ControllerRequest, ControllerResponse, Document, Message, MessageCode,
    MessageType, ProcessorResult,
};
pub use error::{
    ConfigError, ControllerError, DocpipeError, Result, RunError, SnapshotError, StageError,
    StorageError, TransportError,
};
pub use logging::{LogBroadcaster, LogHandle};
pub use pipeline::{Orchestrator, RunBatchSummary};
pub use processor::{Processor, ProcessorRegistry, RunContext, StageSettings};
pub use storage::{FileSystem, LocalFileSystem};
