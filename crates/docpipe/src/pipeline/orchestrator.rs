use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::config::PipelineConfig;
use crate::data::{
    ContextMap, ControllerRequest, Document, Message, ProcessorFilter, ProcessorResult,
};
use crate::error::{ConfigError, RunError, StageError, TransportError};
use crate::processor::{Processor, ProcessorRegistry, RunContext, StageSettings};
use crate::snapshot::{self, SnapshotKind, SnapshotStore};
use crate::transport::{Invocation, Transport};

use super::pool;
use super::summary::{RunBatchSummary, StageFiles};

/// An enabled stage, resolved once at construction.
struct ResolvedStage {
    /// 1-based position in `processor_list`.
    position: usize,
    name: String,
    settings: StageSettings,
    /// `None` for stages executed through an external transport.
    processor: Option<Arc<dyn Processor>>,
    transport: Transport,
}

/// Per-document state between stages.
struct Slot {
    result: ProcessorResult,
    halted: bool,
}

impl Slot {
    fn pending(document: Document, context: ContextMap) -> Self {
        Self {
            result: ProcessorResult::new(document, context),
            halted: false,
        }
    }
}

/// What a stage produced for the active documents.
enum StageOutcome {
    /// One entry per active document, in order.
    PerDocument(Vec<Result<ProcessorResult, Message>>),
    /// A batch call: replaces the active documents, or fails them all.
    Batch(Result<Vec<ProcessorResult>, Message>),
}

/// Runs the enabled stages of a pipeline over a batch of documents.
///
/// Each `(document, context)` pair moves through the stages in configured
/// order. A stage failure halts only the affected document, which keeps the
/// state of its last successful stage plus one ERROR message.
pub struct Orchestrator {
    config: PipelineConfig,
    stages: Vec<ResolvedStage>,
    run: RunContext,
    store: SnapshotStore,
    summary: Option<RunBatchSummary>,
}

impl Orchestrator {
    /// Resolves every enabled stage. In-process stages must be registered;
    /// stages with an external deployment need no local implementation.
    pub fn new(
        config: PipelineConfig,
        registry: &ProcessorRegistry,
        run: RunContext,
    ) -> Result<Self, ConfigError> {
        let mut stages = Vec::new();
        for (idx, stage) in config.processor_list.iter().enumerate() {
            if !stage.enabled {
                debug!("Stage '{}' is disabled", stage.name);
                continue;
            }
            let spec = config.transport_for(&stage.name);
            let processor = if spec.is_external() {
                None
            } else {
                Some(registry.resolve(&stage.name)?)
            };
            stages.push(ResolvedStage {
                position: idx + 1,
                name: stage.name.clone(),
                settings: StageSettings::from_config(&stage.config),
                processor,
                transport: Transport::from_spec(&spec),
            });
        }

        for name in config.deployment.processors.keys() {
            if !config.processor_list.iter().any(|s| &s.name == name) {
                warn!("Deployment entry '{}' matches no stage", name);
            }
        }

        let store = SnapshotStore::new(
            Arc::clone(&run.storage),
            config.orchestrator.work_root.clone(),
        );

        Ok(Self {
            config,
            stages,
            run,
            store,
            summary: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Names of the enabled stages in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Only available after `run_batch` has completed.
    pub fn get_run_batch_summary(&self) -> Option<&RunBatchSummary> {
        self.summary.as_ref()
    }

    /// Runs all enabled stages.
    ///
    /// Without `documents` the first stage is expected to discover the
    /// inputs; at most one seed context is accepted and its keys come first
    /// in every discovered document's context. With N documents `contexts`
    /// may be absent, hold one context cloned to each document, or hold
    /// exactly N.
    pub fn run_batch(
        &mut self,
        documents: Option<Vec<Document>>,
        contexts: Option<Vec<ContextMap>>,
    ) -> Result<Vec<ProcessorResult>, RunError> {
        self.summary = None;
        let mut slots = prepare_slots(documents, contexts)?;

        let run_id = snapshot::new_run_id();
        let run = self.run.for_run(&run_id);
        let _run_span = info_span!("run_batch", run_id = %run_id, stages = self.stages.len())
            .entered();
        let started = Instant::now();
        run.log.info(&format!(
            "Starting run with {} stage(s) over {} input(s)",
            self.stages.len(),
            slots.len()
        ));

        let config_path = if self.stages.iter().any(|s| s.transport.is_external()) {
            Some(self.store.write_config(&run_id, &self.config)?)
        } else {
            None
        };

        let mut summary = RunBatchSummary {
            run_id: run_id.clone(),
            ..RunBatchSummary::default()
        };

        for stage in &self.stages {
            let active: Vec<usize> = (0..slots.len()).filter(|&i| !slots[i].halted).collect();
            if active.is_empty() {
                debug!("No active documents left, stopping before '{}'", stage.name);
                break;
            }

            let stage_run = run.for_stage(&stage.name);
            let _stage_span = info_span!(
                "stage",
                stage = %stage.name,
                mode = stage.transport.mode_name(),
                documents = active.len()
            )
            .entered();
            let stage_started = Instant::now();

            let (outcome, files) = match &stage.processor {
                Some(processor) => {
                    let request_file = if self.config.orchestrator.snapshot_in_process {
                        self.bracket_request(stage, &run_id, &slots, &active)
                    } else {
                        None
                    };
                    let outcome =
                        self.run_in_process(stage, processor.as_ref(), &slots, &active, &stage_run);
                    let files = StageFiles {
                        request_file,
                        response_file: None,
                    };
                    (outcome, files)
                }
                None => self.run_external(stage, &slots, &active, &run_id, config_path.as_deref()),
            };

            let touched = apply_outcome(&mut slots, &active, outcome, &stage.name);
            let halted = touched.iter().filter(|&&i| slots[i].halted).count();

            let files = if stage.processor.is_some() && files.request_file.is_some() {
                StageFiles {
                    response_file: self.bracket_response(stage, &run_id, &slots, &touched),
                    ..files
                }
            } else {
                files
            };

            summary.stage_names.push(stage.name.clone());
            summary.stage_files.insert(stage.name.clone(), files);

            let message = format!(
                "Stage finished in {}ms: {} document(s), {} halted",
                stage_started.elapsed().as_millis(),
                touched.len(),
                halted
            );
            if halted > 0 {
                stage_run.log.warn(&message);
            } else {
                stage_run.log.info(&message);
            }
        }

        summary.document_count = slots.len();
        summary.halted_count = slots.iter().filter(|s| s.halted).count();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            documents = summary.document_count,
            halted = summary.halted_count,
            elapsed_ms = summary.elapsed_ms,
            "Run completed"
        );
        self.summary = Some(summary);

        Ok(slots.into_iter().map(|slot| slot.result).collect())
    }

    fn run_in_process(
        &self,
        stage: &ResolvedStage,
        processor: &dyn Processor,
        slots: &[Slot],
        active: &[usize],
        run: &RunContext,
    ) -> StageOutcome {
        let settings = &stage.settings;
        if processor.supports_batch() {
            let documents: Vec<Document> = active
                .iter()
                .map(|&i| slots[i].result.document.clone())
                .collect();
            let contexts: Vec<ContextMap> = active
                .iter()
                .map(|&i| slots[i].result.context.clone())
                .collect();
            return StageOutcome::Batch(guarded(|| {
                processor.execute_batch(&documents, &contexts, settings, run)
            }));
        }

        let inputs: Vec<&ProcessorResult> = active.iter().map(|&i| &slots[i].result).collect();
        StageOutcome::PerDocument(pool::map_ordered(
            self.config.orchestrator.worker_count(),
            &inputs,
            |input| {
                guarded(|| processor.execute_one(&input.document, &input.context, settings, run))
            },
        ))
    }

    fn run_external(
        &self,
        stage: &ResolvedStage,
        slots: &[Slot],
        active: &[usize],
        run_id: &str,
        config_path: Option<&str>,
    ) -> (StageOutcome, StageFiles) {
        let mut files = StageFiles::default();
        let outcome = self.invoke_external(stage, slots, active, run_id, config_path, &mut files);
        let outcome = match outcome {
            Ok(results) if results.is_empty() => Err(TransportError::Response(
                "executor response carries no records".to_string(),
            )),
            other => other,
        };

        let outcome = outcome.map_err(|e| {
            warn!("Stage '{}' failed at {}: {}", stage.name, e.step(), e);
            e.to_message()
        });
        (StageOutcome::Batch(outcome), files)
    }

    fn invoke_external(
        &self,
        stage: &ResolvedStage,
        slots: &[Slot],
        active: &[usize],
        run_id: &str,
        config_path: Option<&str>,
        files: &mut StageFiles,
    ) -> Result<Vec<ProcessorResult>, TransportError> {
        let request_id = snapshot::request_id(run_id, stage.position);
        let mut envelope = self.store.new_request(run_id, &request_id);
        envelope.description = Some(format!(
            "{} via {}",
            stage.name,
            stage.transport.mode_name()
        ));
        envelope.input_config_file_path = config_path.map(str::to_string);
        envelope.processor_filter = Some(ProcessorFilter::include([stage.name.as_str()]));

        let request = self.snapshot_inputs(envelope, slots, active)?;
        let request_file_path = self.store.write_request(&request)?;
        files.request_file = Some(request_file_path.clone());

        let outcome = stage.transport.invoke(&Invocation {
            store: &self.store,
            request: &request,
            request_file_path: &request_file_path,
            run_id,
        })?;
        files.response_file = Some(outcome.response_file_path.clone());

        self.store
            .load_snapshots(&outcome.response)
            .map_err(|e| TransportError::Response(e.to_string()))
    }

    /// Request envelope for the active documents. A lone seed document is
    /// sent as the envelope's `context` instead of a record.
    fn snapshot_inputs(
        &self,
        mut envelope: ControllerRequest,
        slots: &[Slot],
        active: &[usize],
    ) -> Result<ControllerRequest, TransportError> {
        if let [only] = active {
            if slots[*only].result.document.is_seed() {
                envelope.context = Some(slots[*only].result.context.clone());
                return Ok(envelope);
            }
        }

        // Message snapshots of a request start empty; the executor reports
        // only the messages its stage produced.
        let inputs: Vec<ProcessorResult> = active
            .iter()
            .map(|&i| {
                ProcessorResult::new(
                    slots[i].result.document.clone(),
                    slots[i].result.context.clone(),
                )
            })
            .collect();
        Ok(self
            .store
            .save_snapshots(&envelope, &inputs, SnapshotKind::Request)?)
    }

    /// Writes request snapshots ahead of an in-process stage. Failures are
    /// logged and never affect the run.
    fn bracket_request(
        &self,
        stage: &ResolvedStage,
        run_id: &str,
        slots: &[Slot],
        active: &[usize],
    ) -> Option<String> {
        let request_id = snapshot::request_id(run_id, stage.position);
        let mut envelope = self.store.new_request(run_id, &request_id);
        envelope.description = Some(format!("{} in process", stage.name));
        envelope.processor_filter = Some(ProcessorFilter::include([stage.name.as_str()]));

        let written = self
            .snapshot_inputs(envelope, slots, active)
            .and_then(|request| {
                self.store
                    .write_request(&request)
                    .map_err(TransportError::from)
            });
        match written {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not snapshot request of '{}': {}", stage.name, e);
                None
            }
        }
    }

    /// Writes response snapshots after an in-process stage.
    fn bracket_response(
        &self,
        stage: &ResolvedStage,
        run_id: &str,
        slots: &[Slot],
        touched: &[usize],
    ) -> Option<String> {
        let request_id = snapshot::request_id(run_id, stage.position);
        let envelope = self.store.new_request(run_id, &request_id);
        let results: Vec<ProcessorResult> =
            touched.iter().map(|&i| slots[i].result.clone()).collect();

        let written = self
            .store
            .save_snapshots(&envelope, &results, SnapshotKind::Response)
            .and_then(|response| self.store.write_response(&response));
        match written {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not snapshot response of '{}': {}", stage.name, e);
                None
            }
        }
    }
}

fn prepare_slots(
    documents: Option<Vec<Document>>,
    contexts: Option<Vec<ContextMap>>,
) -> Result<Vec<Slot>, RunError> {
    match documents {
        None => {
            let mut contexts = contexts.unwrap_or_default();
            if contexts.len() > 1 {
                return Err(RunError::TooManySeedContexts(contexts.len()));
            }
            let seed = contexts.pop().unwrap_or_default();
            Ok(vec![Slot::pending(Document::default(), seed)])
        }
        Some(documents) => {
            let count = documents.len();
            let contexts = match contexts {
                None => vec![ContextMap::new(); count],
                Some(contexts) if contexts.len() == count => contexts,
                Some(mut contexts) if contexts.len() == 1 => {
                    let only = contexts.remove(0);
                    vec![only; count]
                }
                Some(contexts) => {
                    return Err(RunError::InputMismatch {
                        documents: count,
                        contexts: contexts.len(),
                    })
                }
            };
            Ok(documents
                .into_iter()
                .zip(contexts)
                .map(|(document, context)| Slot::pending(document, context))
                .collect())
        }
    }
}

/// Folds a stage's outcome into the slots and returns the indices of the
/// slots the stage produced.
fn apply_outcome(
    slots: &mut Vec<Slot>,
    active: &[usize],
    outcome: StageOutcome,
    stage_name: &str,
) -> Vec<usize> {
    let (per_document, keeps_ids) = match outcome {
        StageOutcome::PerDocument(outcomes) => (outcomes, true),
        StageOutcome::Batch(Err(message)) => (vec![Err(message); active.len()], true),
        StageOutcome::Batch(Ok(results)) if results.len() == active.len() => {
            (results.into_iter().map(Ok).collect(), false)
        }
        StageOutcome::Batch(Ok(results)) => {
            return replace_active(slots, active, results, stage_name);
        }
    };

    for (&idx, outcome) in active.iter().zip(per_document) {
        let slot = &mut slots[idx];
        let outcome = match outcome {
            Ok(result) if keeps_ids => check_document_id(&slot.result.document, result),
            other => other,
        };
        match outcome {
            Ok(result) => advance(slot, result, stage_name),
            Err(message) => {
                slot.result.messages.push(stamped(message, stage_name));
                slot.halted = true;
            }
        }
    }
    active.to_vec()
}

/// A batch stage returned a different number of documents than it was
/// given. Its results take the place of the active slots.
fn replace_active(
    slots: &mut Vec<Slot>,
    active: &[usize],
    results: Vec<ProcessorResult>,
    stage_name: &str,
) -> Vec<usize> {
    // Generated documents inherit the ordered union of their inputs' state
    let mut inherited_context = ContextMap::new();
    let mut inherited_messages: Vec<Message> = Vec::new();
    for &idx in active {
        inherited_context = slots[idx].result.context.merged_over(&inherited_context);
        for message in &slots[idx].result.messages {
            if !inherited_messages.contains(message) {
                inherited_messages.push(message.clone());
            }
        }
    }

    let mut produced: Vec<Slot> = results
        .into_iter()
        .map(|result| {
            let mut slot = Slot::pending(Document::default(), inherited_context.clone());
            slot.result.messages = inherited_messages.clone();
            advance(&mut slot, result, stage_name);
            slot
        })
        .collect();

    if produced.is_empty() {
        let mut slot = match active.first() {
            Some(&first) => Slot::pending(
                slots[first].result.document.clone(),
                slots[first].result.context.clone(),
            ),
            None => Slot::pending(Document::default(), ContextMap::new()),
        };
        slot.result.messages = inherited_messages;
        slot.result.messages.push(stamped(
            Message::no_records_found(format!("{} produced no documents", stage_name)),
            stage_name,
        ));
        slot.halted = true;
        produced.push(slot);
    }

    let insert_at = active.first().copied().unwrap_or(slots.len());
    let previous = std::mem::take(slots);
    let mut touched = Vec::with_capacity(produced.len());
    for (idx, slot) in previous.into_iter().enumerate() {
        if idx == insert_at {
            for new_slot in produced.drain(..) {
                touched.push(slots.len());
                slots.push(new_slot);
            }
        }
        if !active.contains(&idx) {
            slots.push(slot);
        }
    }
    for new_slot in produced {
        touched.push(slots.len());
        slots.push(new_slot);
    }
    touched
}

/// A document keeps its id once assigned; only the seed may receive one.
fn check_document_id(
    input: &Document,
    result: ProcessorResult,
) -> Result<ProcessorResult, Message> {
    if input.is_seed() || result.document.document_id == input.document_id {
        return Ok(result);
    }
    warn!(
        "Stage replaced document_id {} with {}",
        input.document_id, result.document.document_id
    );
    Err(Message::unhandled_exception(format!(
        "document_id changed from {} to {}",
        input.document_id, result.document.document_id
    )))
}

/// Moves a slot past a stage that returned `result`.
fn advance(slot: &mut Slot, result: ProcessorResult, stage_name: &str) {
    let ProcessorResult {
        document,
        context,
        messages,
    } = result;

    slot.result.context = context.merged_over(&slot.result.context);
    slot.result.document = document;
    for message in messages {
        let message = stamped(message, stage_name);
        if message.halts() {
            slot.halted = true;
        }
        slot.result.messages.push(message);
    }
}

fn stamped(mut message: Message, stage_name: &str) -> Message {
    if message.processor_name.is_none() {
        message.processor_name = Some(stage_name.to_string());
    }
    message
}

/// Runs a stage call, turning both errors and panics into the single
/// UNHANDLED_EXCEPTION message.
fn guarded<T>(call: impl FnOnce() -> Result<T, StageError>) -> Result<T, Message> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!("Stage failed: {}", e);
            Err(Message::unhandled_exception(e))
        }
        Err(payload) => {
            let text = panic_message(payload.as_ref());
            warn!("Stage panicked: {}", text);
            Err(Message::unhandled_exception(text))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MessageCode, MessageType};
    use serde_json::json;

    fn context_with(key: &str) -> ContextMap {
        let mut context = ContextMap::new();
        context.insert(key, json!({}));
        context
    }

    #[test]
    fn test_prepare_without_documents_accepts_one_seed() {
        let slots = prepare_slots(None, Some(vec![context_with("Preprocessor")])).unwrap();
        assert_eq!(slots.len(), 1);
        assert!(slots[0].result.document.is_seed());
        assert!(slots[0].result.context.contains_key("Preprocessor"));

        let err = prepare_slots(None, Some(vec![ContextMap::new(), ContextMap::new()]));
        assert!(matches!(err, Err(RunError::TooManySeedContexts(2))));
    }

    #[test]
    fn test_prepare_with_documents_zero_one_or_n_contexts() {
        let docs = || vec![Document::new(), Document::new(), Document::new()];

        let slots = prepare_slots(Some(docs()), None).unwrap();
        assert!(slots.iter().all(|s| s.result.context.is_empty()));

        let slots = prepare_slots(Some(docs()), Some(vec![context_with("A")])).unwrap();
        assert!(slots.iter().all(|s| s.result.context.contains_key("A")));

        let contexts = vec![context_with("A"), context_with("B"), context_with("C")];
        let slots = prepare_slots(Some(docs()), Some(contexts)).unwrap();
        assert!(slots[2].result.context.contains_key("C"));

        let err = prepare_slots(Some(docs()), Some(vec![ContextMap::new(), ContextMap::new()]));
        assert!(matches!(
            err,
            Err(RunError::InputMismatch {
                documents: 3,
                contexts: 2
            })
        ));
    }

    #[test]
    fn test_generated_documents_take_the_place_of_their_input() {
        let mut halted = Slot::pending(Document::new(), ContextMap::new());
        halted.halted = true;
        let halted_id = halted.result.document.document_id.clone();
        let mut slots = vec![halted, Slot::pending(Document::default(), context_with("Seed"))];

        let generated: Vec<ProcessorResult> = (0..2)
            .map(|_| ProcessorResult::new(Document::new(), context_with("Discovery")))
            .collect();
        let touched = replace_active(&mut slots, &[1], generated, "Discovery");

        assert_eq!(touched, vec![1, 2]);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].result.document.document_id, halted_id);
        for slot in &slots[1..] {
            assert_eq!(
                slot.result.context.keys().collect::<Vec<_>>(),
                vec!["Seed", "Discovery"]
            );
        }
    }

    #[test]
    fn test_empty_batch_result_reports_no_records() {
        let mut slots = vec![Slot::pending(Document::default(), ContextMap::new())];
        let touched = replace_active(&mut slots, &[0], Vec::new(), "Discovery");

        assert_eq!(touched, vec![0]);
        assert!(slots[0].halted);
        let message = &slots[0].result.messages[0];
        assert_eq!(message.message_type, MessageType::Info);
        assert_eq!(message.message_code, MessageCode::NoRecordsFound);
        assert_eq!(message.processor_name.as_deref(), Some("Discovery"));
    }

    #[test]
    fn test_guarded_converts_errors_and_panics() {
        let err = guarded::<()>(|| Err(StageError::msg("boom"))).unwrap_err();
        assert_eq!(err.message_text, "UNHANDLED EXCEPTION => boom");

        let err = guarded::<()>(|| panic!("kaput")).unwrap_err();
        assert_eq!(err.message_code, MessageCode::UnhandledException);
        assert_eq!(err.message_text, "UNHANDLED EXCEPTION => kaput");
    }
}
