pub mod context;
pub mod discovery;
pub mod settings;
pub mod text;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::{ContextMap, Document, ProcessorResult};
use crate::error::{ConfigError, StageError};

pub use context::RunContext;
pub use discovery::FileDiscovery;
pub use settings::StageSettings;
pub use text::TextLoader;

/// A single pipeline stage.
///
/// Stages receive the current document and context by reference and return
/// a new [`ProcessorResult`]; the inputs stay untouched, so a failing stage
/// leaves the last good state of the document intact.
pub trait Processor: Send + Sync {
    fn execute_one(
        &self,
        document: &Document,
        context: &ContextMap,
        settings: &StageSettings,
        run: &RunContext,
    ) -> Result<ProcessorResult, StageError>;

    /// Whether the orchestrator should hand this stage the whole batch at
    /// once through [`Processor::execute_batch`].
    fn supports_batch(&self) -> bool {
        false
    }

    /// Processes a batch of equal-length `documents` and `contexts`. Stages
    /// that generate documents may return a different number of results.
    fn execute_batch(
        &self,
        documents: &[Document],
        contexts: &[ContextMap],
        settings: &StageSettings,
        run: &RunContext,
    ) -> Result<Vec<ProcessorResult>, StageError> {
        documents
            .iter()
            .zip(contexts)
            .map(|(document, context)| self.execute_one(document, context, settings, run))
            .collect()
    }
}

pub type ProcessorFactory = Arc<dyn Fn() -> Arc<dyn Processor> + Send + Sync>;

/// Startup-time map from stage name to a factory producing the stage.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: BTreeMap<String, ProcessorFactory>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in generic stages.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(discovery::NAME, || Arc::new(FileDiscovery));
        registry.register(text::NAME, || Arc::new(TextLoader));
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Processor> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Registers an already constructed stage; every resolve shares it.
    pub fn register_instance(
        &mut self,
        name: impl Into<String>,
        processor: Arc<dyn Processor>,
    ) -> &mut Self {
        self.register(name, move || Arc::clone(&processor))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Processor>, ConfigError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownProcessor {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    impl Processor for Upper {
        fn execute_one(
            &self,
            document: &Document,
            context: &ContextMap,
            _settings: &StageSettings,
            _run: &RunContext,
        ) -> Result<ProcessorResult, StageError> {
            let mut context = context.clone();
            context.insert("Upper", json!({"seen": document.document_id}));
            Ok(ProcessorResult::new(document.clone(), context))
        }
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = ProcessorRegistry::with_builtins();
        assert!(registry.contains("FileDiscovery"));
        assert!(registry.contains("TextLoader"));
        assert!(registry.resolve("FileDiscovery").unwrap().supports_batch());
        assert!(!registry.resolve("TextLoader").unwrap().supports_batch());
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let registry = ProcessorRegistry::with_builtins();
        match registry.resolve("Nope") {
            Err(ConfigError::UnknownProcessor { name }) => assert_eq!(name, "Nope"),
            Err(other) => panic!("Expected UnknownProcessor, got {:?}", other),
            Ok(_) => panic!("Expected UnknownProcessor error"),
        }
    }

    #[test]
    fn test_default_batch_calls_execute_one_in_order() {
        let documents = vec![Document::new(), Document::new()];
        let contexts = vec![ContextMap::new(), ContextMap::new()];

        let results = Upper
            .execute_batch(
                &documents,
                &contexts,
                &StageSettings::default(),
                &RunContext::for_tests(),
            )
            .unwrap();

        assert_eq!(results.len(), 2);
        for (result, document) in results.iter().zip(&documents) {
            assert_eq!(result.document.document_id, document.document_id);
            assert_eq!(
                result.context.get("Upper").unwrap()["seen"],
                document.document_id
            );
        }
    }

    #[test]
    fn test_register_instance_shares_processor() {
        let mut registry = ProcessorRegistry::new();
        let upper: Arc<dyn Processor> = Arc::new(Upper);
        registry.register_instance("Upper", Arc::clone(&upper));

        let resolved = registry.resolve("Upper").unwrap();
        assert!(Arc::ptr_eq(&resolved, &upper));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Upper"]);
    }
}
