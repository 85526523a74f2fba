//! Scripted stages with predictable outputs.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::json;

use docpipe::{
    ContextMap, Document, Message, MessageCode, MessageType, Processor, ProcessorRegistry,
    ProcessorResult, RunContext, StageError, StageSettings,
};

/// Stage keys in the order the stages were called.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Writes `{<stage>: {"document_id": ..}}` into the context.
pub struct Tagger {
    log: CallLog,
}

impl Tagger {
    pub fn new(log: CallLog) -> Arc<dyn Processor> {
        Arc::new(Self { log })
    }
}

impl Processor for Tagger {
    fn execute_one(
        &self,
        document: &Document,
        context: &ContextMap,
        _settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        let key = run.context_key("Tagger").to_string();
        self.log.lock().unwrap().push(key.clone());
        let mut context = context.clone();
        context.insert(key, json!({"document_id": document.document_id}));
        Ok(ProcessorResult::new(document.clone(), context))
    }
}

/// Always fails with the configured text.
pub struct Failing {
    text: String,
}

impl Failing {
    pub fn new(text: &str) -> Arc<dyn Processor> {
        Arc::new(Self {
            text: text.to_string(),
        })
    }
}

impl Processor for Failing {
    fn execute_one(
        &self,
        _document: &Document,
        _context: &ContextMap,
        _settings: &StageSettings,
        _run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        Err(StageError::msg(self.text.clone()))
    }
}

/// Fails only for documents whose id is listed.
pub struct FailFor {
    document_ids: Vec<String>,
}

impl FailFor {
    pub fn new(document_ids: &[&str]) -> Arc<dyn Processor> {
        Arc::new(Self {
            document_ids: document_ids.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl Processor for FailFor {
    fn execute_one(
        &self,
        document: &Document,
        context: &ContextMap,
        _settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        if self.document_ids.contains(&document.document_id) {
            return Err(StageError::msg(format!("cannot handle {}", document.document_id)));
        }
        let mut context = context.clone();
        context.insert(run.context_key("FailFor"), json!({"ok": true}));
        Ok(ProcessorResult::new(document.clone(), context))
    }
}

/// Tags the context and adds a non-halting WARNING.
pub struct Warner;

impl Warner {
    pub fn new() -> Arc<dyn Processor> {
        Arc::new(Self)
    }
}

impl Processor for Warner {
    fn execute_one(
        &self,
        document: &Document,
        context: &ContextMap,
        _settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        let mut context = context.clone();
        context.insert(run.context_key("Warner"), json!({"checked": true}));
        Ok(ProcessorResult::new(document.clone(), context).with_message(Message::new(
            MessageType::Warning,
            MessageCode::Success,
            "page 2 looks blank",
        )))
    }
}

/// Batch stage emitting two documents per input, each with a fresh context
/// holding only its own key.
pub struct Splitter;

impl Splitter {
    pub fn new() -> Arc<dyn Processor> {
        Arc::new(Self)
    }
}

impl Processor for Splitter {
    fn execute_one(
        &self,
        _document: &Document,
        _context: &ContextMap,
        _settings: &StageSettings,
        _run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        Err(StageError::msg("Splitter only runs as a batch"))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn execute_batch(
        &self,
        documents: &[Document],
        _contexts: &[ContextMap],
        _settings: &StageSettings,
        run: &RunContext,
    ) -> Result<Vec<ProcessorResult>, StageError> {
        let key = run.context_key("Splitter").to_string();
        Ok(documents
            .iter()
            .flat_map(|parent| {
                let key = &key;
                ["a", "b"].into_iter().map(move |part| {
                    let mut document = Document::new();
                    document.document_id = format!("{}-{}", parent.document_id, part);
                    let mut context = ContextMap::new();
                    context.insert(key.clone(), json!({"parent": parent.document_id}));
                    ProcessorResult::new(document, context)
                })
            })
            .collect())
    }
}

/// Batch stage that fails as a whole.
pub struct BatchFailing;

impl BatchFailing {
    pub fn new() -> Arc<dyn Processor> {
        Arc::new(Self)
    }
}

impl Processor for BatchFailing {
    fn execute_one(
        &self,
        _document: &Document,
        _context: &ContextMap,
        _settings: &StageSettings,
        _run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        Err(StageError::msg("not used"))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn execute_batch(
        &self,
        documents: &[Document],
        _contexts: &[ContextMap],
        _settings: &StageSettings,
        _run: &RunContext,
    ) -> Result<Vec<ProcessorResult>, StageError> {
        Err(StageError::msg(format!(
            "index offline for {} document(s)",
            documents.len()
        )))
    }
}

/// Returns each document under a new id.
pub struct Renamer;

impl Renamer {
    pub fn new() -> Arc<dyn Processor> {
        Arc::new(Self)
    }
}

impl Processor for Renamer {
    fn execute_one(
        &self,
        document: &Document,
        context: &ContextMap,
        _settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        let mut renamed = document.clone();
        renamed.document_id = format!("{}-renamed", document.document_id);
        let mut context = context.clone();
        context.insert(run.context_key("Renamer"), json!({}));
        Ok(ProcessorResult::new(renamed, context))
    }
}

/// Batch stage that turns the seed into `count` documents.
pub struct Generator {
    count: usize,
}

impl Generator {
    pub fn new(count: usize) -> Arc<dyn Processor> {
        Arc::new(Self { count })
    }
}

impl Processor for Generator {
    fn execute_one(
        &self,
        document: &Document,
        context: &ContextMap,
        settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        let mut results = self.execute_batch(
            std::slice::from_ref(document),
            std::slice::from_ref(context),
            settings,
            run,
        )?;
        results
            .pop()
            .ok_or_else(|| StageError::msg("generator produced nothing"))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn execute_batch(
        &self,
        _documents: &[Document],
        _contexts: &[ContextMap],
        _settings: &StageSettings,
        run: &RunContext,
    ) -> Result<Vec<ProcessorResult>, StageError> {
        let key = run.context_key("Generator").to_string();
        Ok((0..self.count)
            .map(|index| {
                let mut document = Document::new();
                document.document_id = format!("D-{:03}", index);
                let mut context = ContextMap::new();
                context.insert(key.clone(), json!({"index": index}));
                ProcessorResult::new(document, context)
            })
            .collect())
    }
}

/// Sleeps longer for earlier documents so that, with several workers,
/// completion order is the reverse of input order.
pub struct Sleeper {
    total: u64,
}

impl Sleeper {
    pub fn new(total: u64) -> Arc<dyn Processor> {
        Arc::new(Self { total })
    }
}

impl Processor for Sleeper {
    fn execute_one(
        &self,
        document: &Document,
        context: &ContextMap,
        _settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        let index = context
            .get("Generator")
            .and_then(|v| v.get("index"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        thread::sleep(Duration::from_millis(self.total.saturating_sub(index) * 15));
        let mut context = context.clone();
        context.insert(run.context_key("Sleeper"), json!({"slept_for": index}));
        Ok(ProcessorResult::new(document.clone(), context))
    }
}

pub fn registry_with(stages: Vec<(&str, Arc<dyn Processor>)>) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::with_builtins();
    for (name, processor) in stages {
        registry.register_instance(name, processor);
    }
    registry
}
