//! Execution of hybrid stages outside the orchestrating process.
//!
//! The orchestrator writes the stage's input snapshots and a controller
//! request, hands the request to a [`Transport`], and reloads the state the
//! returned [`ControllerResponse`] points at.

pub mod http;
pub mod subprocess;

use crate::config::variables::{
    VariableEngine, SYS_CONTROLLER_REQ_FILE_PATH, SYS_REQUEST_ID, SYS_RUN_ID, SYS_STORAGE_ROOT,
};
use crate::config::TransportSpec;
use crate::data::{ControllerRequest, ControllerResponse, Message, MessageCode};
use crate::error::TransportError;
use crate::snapshot::SnapshotStore;

pub use http::HttpTransport;
pub use subprocess::SubprocessTransport;

/// Environment variable carrying the storage root URI to a child executor.
pub const STORAGE_ROOT_ENV: &str = "DOCPIPE_STORAGE_ROOT";
/// Header carrying the storage root URI to a remote executor.
pub const STORAGE_ROOT_HEADER: &str = "DPP-STORAGE-ROOT-URI";

/// One stage invocation handed to an external executor.
pub struct Invocation<'a> {
    pub store: &'a SnapshotStore,
    pub request: &'a ControllerRequest,
    pub request_file_path: &'a str,
    pub run_id: &'a str,
}

impl Invocation<'_> {
    pub fn storage_root(&self) -> String {
        self.store.storage().root_uri()
    }

    /// Engine resolving the `${SYS_*}` runtime variables of this invocation.
    pub fn variables(&self) -> VariableEngine {
        VariableEngine::default()
            .with_value(SYS_CONTROLLER_REQ_FILE_PATH, self.request_file_path)
            .with_value(SYS_STORAGE_ROOT, self.storage_root())
            .with_value(SYS_RUN_ID, self.run_id)
            .with_value(SYS_REQUEST_ID, self.request.request_id.as_str())
    }
}

#[derive(Debug)]
pub struct TransportOutcome {
    pub response: ControllerResponse,
    pub response_file_path: String,
}

pub enum Transport {
    InProcess,
    Subprocess(SubprocessTransport),
    Http(HttpTransport),
}

impl Transport {
    pub fn from_spec(spec: &TransportSpec) -> Self {
        match spec {
            TransportSpec::InProcess => Transport::InProcess,
            TransportSpec::Subprocess(spec) => {
                Transport::Subprocess(SubprocessTransport::new(spec.clone()))
            }
            TransportSpec::Http(spec) => Transport::Http(HttpTransport::new(spec.clone())),
        }
    }

    pub fn is_external(&self) -> bool {
        !matches!(self, Transport::InProcess)
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Transport::InProcess => "in_process",
            Transport::Subprocess(_) => "subprocess",
            Transport::Http(_) => "http",
        }
    }

    /// Runs the invocation on the external executor and returns its
    /// response. Blocks until the executor is done or its timeout expires.
    pub fn invoke(&self, invocation: &Invocation<'_>) -> Result<TransportOutcome, TransportError> {
        match self {
            Transport::InProcess => Err(TransportError::Launch(
                "in-process stages have no external executor".to_string(),
            )),
            Transport::Subprocess(transport) => transport.invoke(invocation),
            Transport::Http(transport) => transport.invoke(invocation),
        }
    }
}

impl TransportError {
    pub fn message_code(&self) -> MessageCode {
        match self {
            TransportError::Launch(_) | TransportError::ExitStatus { .. } => {
                MessageCode::ProcessLaunchFailed
            }
            TransportError::Snapshot(_) => MessageCode::SnapshotFailed,
            TransportError::Timeout(_) => MessageCode::ExecutorTimeout,
            TransportError::Remote(_) => MessageCode::RemoteCallFailed,
            TransportError::Response(_) => MessageCode::ResponseParseFailed,
        }
    }

    /// Integration step that failed, as shown in the message text.
    pub fn step(&self) -> &'static str {
        match self {
            TransportError::Launch(_) => "process launch",
            TransportError::ExitStatus { .. } => "process exit",
            TransportError::Snapshot(_) => "request snapshot",
            TransportError::Timeout(_) => "executor wait",
            TransportError::Remote(_) => "remote call",
            TransportError::Response(_) => "response parsing",
        }
    }

    pub fn to_message(&self) -> Message {
        Message::transport_failure(self.message_code(), self.step(), self)
    }
}
