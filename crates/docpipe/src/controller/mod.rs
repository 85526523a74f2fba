//! Thin adapters that source a [`ControllerRequest`], run it and hand back
//! the [`ControllerResponse`]. All pipeline logic lives in the orchestrator.

pub mod cli;
pub mod http;
pub mod memory;

use std::sync::Arc;

use tracing::{info, info_span};

use crate::config::{load_pipeline_config, DEFAULT_WORK_ROOT};
use crate::data::{ContextMap, ControllerRequest, ControllerResponse, Document, DPP_VERSION};
use crate::error::ControllerError;
use crate::pipeline::Orchestrator;
use crate::processor::{ProcessorRegistry, RunContext};
use crate::snapshot::{self, SnapshotKind, SnapshotStore};

pub use cli::CliController;
pub use http::{router, serve, HttpController};
pub use memory::InMemoryController;

pub trait Controller {
    /// Where a request comes from: a file path, an HTTP body, a value.
    type Source;
    /// What the caller gets back: a file path, an HTTP body, a value.
    type Sent;

    fn receive_request(&self, source: Self::Source) -> Result<ControllerRequest, ControllerError>;

    fn execute(&self, request: ControllerRequest) -> Result<ControllerResponse, ControllerError>;

    fn send_response(&self, response: &ControllerResponse) -> Result<Self::Sent, ControllerError>;

    fn handle(&self, source: Self::Source) -> Result<Self::Sent, ControllerError> {
        let request = self.receive_request(source)?;
        let response = self.execute(request)?;
        self.send_response(&response)
    }
}

/// Registry and capabilities shared by every controller.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<ProcessorRegistry>,
    run: RunContext,
}

impl Executor {
    pub fn new(registry: ProcessorRegistry, run: RunContext) -> Self {
        Self {
            registry: Arc::new(registry),
            run,
        }
    }

    pub fn run_context(&self) -> &RunContext {
        &self.run
    }

    /// Store for reading envelopes that are addressed by explicit paths.
    pub fn envelope_store(&self) -> SnapshotStore {
        SnapshotStore::new(Arc::clone(&self.run.storage), DEFAULT_WORK_ROOT)
    }

    pub fn execute(&self, request: &ControllerRequest) -> Result<ControllerResponse, ControllerError> {
        execute_request(request, &self.registry, &self.run)
    }
}

/// Runs the stages a request selects over the state its snapshots hold.
///
/// Every selected stage runs in this process, whatever the config's
/// deployment section says; this is the executor side of a hybrid stage.
pub fn execute_request(
    request: &ControllerRequest,
    registry: &ProcessorRegistry,
    run: &RunContext,
) -> Result<ControllerResponse, ControllerError> {
    if let Some(filter) = &request.processor_filter {
        filter.validate()?;
    }
    let config_path = request
        .input_config_file_path
        .as_deref()
        .ok_or(ControllerError::MissingField("input_config_file_path"))?;

    let request_id = if request.request_id.is_empty() {
        snapshot::new_run_id()
    } else {
        request.request_id.clone()
    };
    let _span = info_span!("execute_request", request_id = %request_id).entered();

    let mut config = load_pipeline_config(run.storage(), config_path)?;
    if let Some(filter) = &request.processor_filter {
        for stage in &mut config.processor_list {
            stage.enabled = stage.enabled && filter.allows(&stage.name);
        }
    }
    config.deployment.processors.clear();

    let store = SnapshotStore::new(
        Arc::clone(&run.storage),
        config.orchestrator.work_root.clone(),
    );
    let loaded = store.load_snapshots(request)?;

    let mut orchestrator = Orchestrator::new(config, registry, run.clone())?;
    info!(
        "Executing {:?} over {} record(s)",
        orchestrator.stage_names(),
        request.records.len()
    );

    let (documents, contexts): (Vec<Document>, Vec<ContextMap>) = loaded
        .into_iter()
        .map(|result| (result.document, result.context))
        .unzip();
    let results = if request.records.is_empty() {
        orchestrator.run_batch(None, Some(contexts))?
    } else {
        orchestrator.run_batch(Some(documents), Some(contexts))?
    };

    let envelope = ControllerResponse {
        dpp_version: DPP_VERSION.to_string(),
        request_id,
        context: None,
        records: Vec::new(),
        ..request.clone()
    };
    Ok(store.save_snapshots(&envelope, &results, SnapshotKind::Response)?)
}
