use serde_json::{json, Value};

use crate::data::{ContextMap, Document, ProcessorResult};
use crate::error::StageError;
use crate::processor::{discovery, Processor, RunContext, StageSettings};

pub const NAME: &str = "TextLoader";

/// Loads a plain-text document into `text_data`.
///
/// The file is taken from the `work_file_path` written by the stage named in
/// the `source_key` setting (default `FileDiscovery`), falling back to the
/// document's own file path.
pub struct TextLoader;

impl TextLoader {
    fn work_file_path(
        document: &Document,
        context: &ContextMap,
        settings: &StageSettings,
    ) -> Result<String, StageError> {
        let source_key = settings.get_str("source_key").unwrap_or(discovery::NAME);
        context
            .get(source_key)
            .and_then(|value| value.get("work_file_path"))
            .and_then(Value::as_str)
            .or_else(|| document.filepath())
            .map(str::to_string)
            .ok_or_else(|| {
                StageError::msg(format!(
                    "document {} has no file to load",
                    document.document_id
                ))
            })
    }
}

impl Processor for TextLoader {
    fn execute_one(
        &self,
        document: &Document,
        context: &ContextMap,
        settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        let path = Self::work_file_path(document, context, settings)?;
        let text = run.storage().read_to_string(&path)?;

        let mut document = document.clone();
        document.text_data.push(Value::String(text.clone()));

        let mut context = context.clone();
        context.insert(
            run.context_key(NAME),
            json!({
                "file_path": path,
                "char_count": text.chars().count(),
                "line_count": text.lines().count(),
            }),
        );

        run.log.debug(&format!(
            "Loaded {} char(s) for {}",
            text.chars().count(),
            document.document_id
        ));
        Ok(ProcessorResult::new(document, context))
    }
}
