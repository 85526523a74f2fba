use serde::{Deserialize, Serialize};

use super::{ContextMap, Document, Message, MessageCode};

/// The `(document, context, messages)` triple every stage call returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorResult {
    pub document: Document,
    pub context: ContextMap,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ProcessorResult {
    pub fn new(document: Document, context: ContextMap) -> Self {
        Self {
            document,
            context,
            messages: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// First message that stops the pipeline for this document, if any.
    pub fn halting_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.halts())
    }

    pub fn has_code(&self, code: MessageCode) -> bool {
        self.messages.iter().any(|m| m.message_code == code)
    }

    pub fn messages_with_code(&self, code: MessageCode) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.message_code == code)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halting_message_skips_success() {
        let result = ProcessorResult::new(Document::new(), ContextMap::new())
            .with_message(Message::info(MessageCode::Success, "fine"))
            .with_message(Message::unhandled_exception("bad"));

        let halting = result.halting_message().unwrap();
        assert_eq!(halting.message_code, MessageCode::UnhandledException);
        assert!(result.has_code(MessageCode::Success));
        assert_eq!(result.messages_with_code(MessageCode::Success).len(), 1);
    }
}
