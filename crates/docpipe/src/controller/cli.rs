use std::io::Write;

use tracing::info;

use crate::data::{ControllerRequest, ControllerResponse};
use crate::error::ControllerError;
use crate::snapshot::{self, SnapshotStore};
use crate::transport::subprocess::RESPONSE_PATH_PREFIX;

use super::{Controller, Executor};

/// Runs one request file and writes the response file next to it.
///
/// This is the other end of the subprocess transport: the response path is
/// announced on stdout as `response_file_path=<path>`.
pub struct CliController {
    executor: Executor,
    store: SnapshotStore,
    request_file_path: String,
}

impl CliController {
    pub fn new(executor: Executor, request_file_path: impl Into<String>) -> Self {
        let store = executor.envelope_store();
        Self {
            executor,
            store,
            request_file_path: request_file_path.into(),
        }
    }

    pub fn response_file_path(&self) -> String {
        snapshot::response_path_for(&self.request_file_path)
    }

    /// Handles the request and prints the status lines to `out`.
    pub fn run(&self, out: &mut dyn Write) -> Result<String, ControllerError> {
        let response_file_path = self.handle(())?;
        // Status lines are best effort
        let _ = writeln!(out, "status=success");
        let _ = writeln!(out, "{}{}", RESPONSE_PATH_PREFIX, response_file_path);
        Ok(response_file_path)
    }
}

impl Controller for CliController {
    /// The request path is fixed at construction.
    type Source = ();
    type Sent = String;

    fn receive_request(&self, _source: ()) -> Result<ControllerRequest, ControllerError> {
        info!("Reading request {}", self.request_file_path);
        self.store
            .read_request(&self.request_file_path)
            .map_err(|e| ControllerError::ReadRequest {
                path: self.request_file_path.clone(),
                source: e,
            })
    }

    fn execute(&self, request: ControllerRequest) -> Result<ControllerResponse, ControllerError> {
        self.executor.execute(&request)
    }

    fn send_response(&self, response: &ControllerResponse) -> Result<String, ControllerError> {
        let path = self.response_file_path();
        self.store.write_envelope(&path, response)?;
        info!("Wrote response {}", path);
        Ok(path)
    }
}
