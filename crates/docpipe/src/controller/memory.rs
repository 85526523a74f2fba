use crate::data::{ControllerRequest, ControllerResponse};
use crate::error::ControllerError;

use super::{Controller, Executor};

/// Takes requests as values and hands responses back as values. Used by
/// embedders and tests that do not want a process or a socket in between.
pub struct InMemoryController {
    executor: Executor,
}

impl InMemoryController {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

impl Controller for InMemoryController {
    type Source = ControllerRequest;
    type Sent = ControllerResponse;

    fn receive_request(&self, source: ControllerRequest) -> Result<ControllerRequest, ControllerError> {
        if let Some(filter) = &source.processor_filter {
            filter.validate()?;
        }
        Ok(source)
    }

    fn execute(&self, request: ControllerRequest) -> Result<ControllerResponse, ControllerError> {
        self.executor.execute(&request)
    }

    fn send_response(&self, response: &ControllerResponse) -> Result<ControllerResponse, ControllerError> {
        Ok(response.clone())
    }
}
