use glob::Pattern;
use serde_json::json;

use crate::data::{ContextMap, Document, Message, ProcessorResult};
use crate::error::StageError;
use crate::processor::{Processor, RunContext, StageSettings};

pub const NAME: &str = "FileDiscovery";

/// Batch-producing stage that turns the files under `from_dir` into
/// documents.
///
/// Settings:
/// - `from_dir` (required): logical directory listed recursively.
/// - `pattern`: glob matched against the file name, e.g. `*.txt`.
/// - `to_dir`: when set, each file is copied to `{to_dir}/{document_id}/`
///   and later stages work on the copy.
pub struct FileDiscovery;

impl FileDiscovery {
    fn discover(
        &self,
        seed_context: &ContextMap,
        settings: &StageSettings,
        run: &RunContext,
    ) -> Result<Vec<ProcessorResult>, StageError> {
        let from_dir = settings.require_str("from_dir")?;
        let pattern = match settings.get_str("pattern") {
            Some(raw) => Some(Pattern::new(raw).map_err(|e| StageError::InvalidSetting {
                key: "pattern".to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };
        let to_dir = settings.get_str("to_dir");
        let key = run.context_key(NAME);

        let files: Vec<String> = run
            .storage()
            .list(from_dir)?
            .into_iter()
            .filter(|path| {
                let file_name = path.rsplit('/').next().unwrap_or(path);
                pattern.as_ref().map_or(true, |p| p.matches(file_name))
            })
            .collect();

        if files.is_empty() {
            run.log.info(&format!("No files found under {}", from_dir));
            return Ok(vec![ProcessorResult::new(Document::default(), seed_context.clone())
                .with_message(Message::no_records_found(format!(
                    "No files found under {}",
                    from_dir
                )))]);
        }

        let mut results = Vec::with_capacity(files.len());
        for source_path in files {
            let mut document = Document::for_file(&source_path);

            let work_file_path = match to_dir {
                Some(to_dir) => {
                    let file_name = source_path.rsplit('/').next().unwrap_or(&source_path);
                    let target = format!(
                        "{}/{}/{}",
                        to_dir.trim_end_matches('/'),
                        document.document_id,
                        file_name
                    );
                    run.storage().copy(&source_path, &target)?;
                    target
                }
                None => source_path.clone(),
            };
            if let Some(standard) = document.metadata.standard_data.as_mut() {
                standard.size = run.storage().read(&work_file_path).ok().map(|b| b.len() as u64);
            }

            run.log.debug(&format!(
                "Discovered {} as {}",
                source_path, document.document_id
            ));

            let mut context = seed_context.clone();
            context.insert(
                key,
                json!({
                    "source_file_path": source_path,
                    "work_file_path": work_file_path,
                }),
            );
            results.push(ProcessorResult::new(document, context));
        }

        run.log
            .info(&format!("Discovered {} file(s) under {}", results.len(), from_dir));
        Ok(results)
    }
}

impl Processor for FileDiscovery {
    /// Single-document calls discover into the given context; the document
    /// itself is replaced by the discovered ones.
    fn execute_one(
        &self,
        _document: &Document,
        context: &ContextMap,
        settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError> {
        let mut results = self.discover(context, settings, run)?;
        if results.len() > 1 {
            return Err(StageError::msg(format!(
                "{} found {} files; run it as a batch stage",
                NAME,
                results.len()
            )));
        }
        Ok(results.remove(0))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn execute_batch(
        &self,
        _documents: &[Document],
        contexts: &[ContextMap],
        settings: &StageSettings,
        run: &RunContext,
    ) -> Result<Vec<ProcessorResult>, StageError> {
        let seed = contexts.first().cloned().unwrap_or_default();
        self.discover(&seed, settings, run)
    }
}
