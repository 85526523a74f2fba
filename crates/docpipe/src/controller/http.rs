//! Remote executor endpoint.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/execute` | Run a [`ControllerRequest`], answer with an [`ExecuteEnvelope`] |
//! | `GET`  | `/health` | Liveness check (returns version) |
//!
//! Failures keep the envelope shape with `response` omitted; `code` mirrors
//! the HTTP status.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::data::{ControllerRequest, ControllerResponse, ExecuteEnvelope, DPP_VERSION};
use crate::error::ControllerError;
use crate::transport::STORAGE_ROOT_HEADER;

use super::{Controller, Executor};

/// Controller behind `POST /execute`.
#[derive(Clone)]
pub struct HttpController {
    executor: Executor,
}

impl HttpController {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

impl Controller for HttpController {
    type Source = Bytes;
    type Sent = ExecuteEnvelope;

    fn receive_request(&self, source: Bytes) -> Result<ControllerRequest, ControllerError> {
        let request: ControllerRequest = serde_json::from_slice(&source)
            .map_err(|e| ControllerError::InvalidBody(e.to_string()))?;
        if let Some(filter) = &request.processor_filter {
            filter.validate()?;
        }
        Ok(request)
    }

    fn execute(&self, request: ControllerRequest) -> Result<ControllerResponse, ControllerError> {
        self.executor.execute(&request)
    }

    /// `elapsed_time_ms` is filled in by the handler.
    fn send_response(&self, response: &ControllerResponse) -> Result<ExecuteEnvelope, ControllerError> {
        Ok(ExecuteEnvelope::success(response.clone(), 0))
    }
}

struct AppError {
    status: StatusCode,
    message: String,
    elapsed_time_ms: u64,
}

impl AppError {
    fn from_controller(err: ControllerError, started: Instant) -> Self {
        let status = match &err {
            ControllerError::InvalidBody(_)
            | ControllerError::MissingField(_)
            | ControllerError::InvalidFilter => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
            elapsed_time_ms: elapsed_ms(started),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ExecuteEnvelope::failure(self.status.as_u16(), self.message, self.elapsed_time_ms);
        (self.status, Json(body)).into_response()
    }
}

pub fn router(executor: Executor) -> Router {
    Router::new()
        .route("/execute", post(handle_execute))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(HttpController::new(executor))
}

/// Binds `bind` and serves until ctrl-c.
pub async fn serve(bind: &str, executor: Executor) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Executor listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(executor))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
}

async fn handle_execute(
    State(controller): State<HttpController>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ExecuteEnvelope>, AppError> {
    let started = Instant::now();
    if let Some(root) = headers.get(STORAGE_ROOT_HEADER).and_then(|v| v.to_str().ok()) {
        debug!("Caller storage root: {}", root);
    }

    // Pipeline stages block; keep them off the async workers.
    let outcome = tokio::task::spawn_blocking(move || controller.handle(body))
        .await
        .map_err(|e| ControllerError::Join(e.to_string()));

    match outcome.and_then(|result| result) {
        Ok(mut envelope) => {
            envelope.elapsed_time_ms = elapsed_ms(started);
            Ok(Json(envelope))
        }
        Err(e) => {
            error!("Execute request failed: {}", e);
            Err(AppError::from_controller(e, started))
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: DPP_VERSION.to_string(),
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
