//! Logging capability handed to the orchestrator and to stages.
//!
//! Every call is emitted as a `tracing` event tagged with the run id and the
//! stage name. When a [`LogBroadcaster`] is attached the event is also
//! forwarded to its subscribers, which lets a controller capture the log
//! stream of one run without touching global subscriber state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub run_id: Option<String>,
    pub stage: Option<String>,
    pub message: String,
}

#[derive(Clone)]
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEvent>,
}

impl LogBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: LogEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[derive(Clone, Default)]
pub struct LogHandle {
    run_id: Option<String>,
    stage: Option<String>,
    broadcaster: Option<Arc<LogBroadcaster>>,
}

impl LogHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broadcaster(broadcaster: Arc<LogBroadcaster>) -> Self {
        Self {
            broadcaster: Some(broadcaster),
            ..Self::default()
        }
    }

    pub fn for_run(&self, run_id: &str) -> Self {
        Self {
            run_id: Some(run_id.to_string()),
            ..self.clone()
        }
    }

    pub fn for_stage(&self, stage: &str) -> Self {
        Self {
            stage: Some(stage.to_string()),
            ..self.clone()
        }
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let run_id = self.run_id.as_deref().unwrap_or("-");
        let stage = self.stage.as_deref().unwrap_or("-");
        match level {
            LogLevel::Debug => tracing::debug!(run_id, stage, "{}", message),
            LogLevel::Info => tracing::info!(run_id, stage, "{}", message),
            LogLevel::Warn => tracing::warn!(run_id, stage, "{}", message),
            LogLevel::Error => tracing::error!(run_id, stage, "{}", message),
        }

        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(LogEvent {
                timestamp: Utc::now(),
                level,
                run_id: self.run_id.clone(),
                stage: self.stage.clone(),
                message: message.to_string(),
            });
        }
    }
}
