use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved prefix of the text carried by an unhandled stage failure.
pub const UNHANDLED_EXCEPTION_PREFIX: &str = "UNHANDLED EXCEPTION => ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageCode {
    Success,
    NoRecordsFound,
    UnhandledException,
    /// The executor process could not be started, exited non-zero, or did
    /// not report a response file.
    ProcessLaunchFailed,
    ExecutorTimeout,
    /// The response artifact returned by an external executor was unreadable.
    ResponseParseFailed,
    RemoteCallFailed,
    /// The stage's input snapshots could not be written, whatever the
    /// transport.
    SnapshotFailed,
}

impl MessageCode {
    /// Codes that stop any further stage from running for a document.
    pub fn halts(self) -> bool {
        !matches!(self, MessageCode::Success)
    }

    pub fn is_transport_failure(self) -> bool {
        matches!(
            self,
            MessageCode::ProcessLaunchFailed
                | MessageCode::ExecutorTimeout
                | MessageCode::ResponseParseFailed
                | MessageCode::RemoteCallFailed
                | MessageCode::SnapshotFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_type: MessageType,
    pub message_code: MessageCode,
    pub message_text: String,
    /// Stage that produced the message. Stamped by the orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_name: Option<String>,
}

impl Message {
    pub fn new(
        message_type: MessageType,
        message_code: MessageCode,
        message_text: impl Into<String>,
    ) -> Self {
        Self {
            message_type,
            message_code,
            message_text: message_text.into(),
            processor_name: None,
        }
    }

    pub fn info(message_code: MessageCode, message_text: impl Into<String>) -> Self {
        Self::new(MessageType::Info, message_code, message_text)
    }

    pub fn no_records_found(message_text: impl Into<String>) -> Self {
        Self::info(MessageCode::NoRecordsFound, message_text)
    }

    /// The single ERROR message recorded when a stage fails.
    pub fn unhandled_exception(error: impl fmt::Display) -> Self {
        Self::new(
            MessageType::Error,
            MessageCode::UnhandledException,
            format!("{}{}", UNHANDLED_EXCEPTION_PREFIX, error),
        )
    }

    /// ERROR message for a failed hybrid integration step.
    pub fn transport_failure(
        message_code: MessageCode,
        step: &str,
        detail: impl fmt::Display,
    ) -> Self {
        Self::new(
            MessageType::Error,
            message_code,
            format!("TRANSPORT FAILURE [{}] => {}", step, detail),
        )
    }

    pub fn halts(&self) -> bool {
        self.message_code.halts() && self.message_type != MessageType::Warning
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}: {}",
            self.message_type, self.message_code, self.message_text
        )
    }
}

/// Snapshot form of a message list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl From<Vec<Message>> for MessageData {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhandled_exception_text() {
        let message = Message::unhandled_exception("boom");
        assert_eq!(message.message_type, MessageType::Error);
        assert_eq!(message.message_code, MessageCode::UnhandledException);
        assert_eq!(message.message_text, "UNHANDLED EXCEPTION => boom");
    }

    #[test]
    fn test_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&Message::no_records_found("none")).unwrap();
        assert!(json.contains(r#""message_type":"INFO""#));
        assert!(json.contains(r#""message_code":"NO_RECORDS_FOUND""#));
    }

    #[test]
    fn test_success_does_not_halt() {
        assert!(!Message::info(MessageCode::Success, "ok").halts());
        assert!(Message::no_records_found("none").halts());
        assert!(Message::unhandled_exception("x").halts());
    }

    #[test]
    fn test_transport_codes_are_distinct_from_stage_failure() {
        assert!(MessageCode::RemoteCallFailed.is_transport_failure());
        assert!(!MessageCode::UnhandledException.is_transport_failure());
    }
}
