use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::HttpSpec;
use crate::data::ExecuteEnvelope;
use crate::error::TransportError;
use crate::transport::{Invocation, TransportOutcome, STORAGE_ROOT_HEADER};

/// Runs a stage by POSTing the controller request to a remote executor.
///
/// Success requires HTTP 200 and an [`ExecuteEnvelope`] carrying the
/// response, which is persisted next to the request file.
pub struct HttpTransport {
    spec: HttpSpec,
}

impl HttpTransport {
    pub fn new(spec: HttpSpec) -> Self {
        Self { spec }
    }

    pub fn invoke(&self, invocation: &Invocation<'_>) -> Result<TransportOutcome, TransportError> {
        let vars = invocation.variables();
        let url = vars.substitute(&self.spec.url);
        let timeout = self.spec.timeout();

        // A blocking client must not be created or dropped on an async task.
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Remote(format!("failed to build HTTP client: {}", e)))?;

        let mut request = client
            .post(&url)
            .header(STORAGE_ROOT_HEADER, invocation.storage_root())
            .json(invocation.request);
        for (name, value) in &self.spec.headers {
            request = request.header(name.as_str(), vars.substitute(value));
        }

        debug!("POST {}", url);
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else {
                TransportError::Remote(format!("POST {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TransportError::Remote(format!("failed to read body: {}", e)))?;
        if status != StatusCode::OK {
            return Err(TransportError::Remote(format!(
                "POST {} returned {}: {}",
                url,
                status,
                body.trim()
            )));
        }

        let envelope: ExecuteEnvelope = serde_json::from_str(&body)
            .map_err(|e| TransportError::Response(format!("invalid response body: {}", e)))?;
        let response = envelope.response.ok_or_else(|| {
            TransportError::Response(format!(
                "response body carries no response ({}: {})",
                envelope.code, envelope.message
            ))
        })?;

        let response_file_path = invocation
            .store
            .write_response(&response)
            .map_err(|e| TransportError::Response(e.to_string()))?;
        Ok(TransportOutcome {
            response,
            response_file_path,
        })
    }
}
