//! File-based snapshots of `(document, context, messages)` state.
//!
//! Layout below the work root:
//!
//! ```text
//! {work_root}/{request_id}_controller_request.json
//! {work_root}/{request_id}_controller_response.json
//! {work_root}/snapshots/{run_id}/pipeline_config.json
//! {work_root}/snapshots/{run_id}/{request_id}_{kind}_{document_id}.document_data.json
//! {work_root}/snapshots/{run_id}/{request_id}_{kind}_{document_id}.context_data.json
//! {work_root}/snapshots/{run_id}/{request_id}_{kind}_{document_id}.message_data.json
//! ```
//!
//! `kind` is `request` for the state handed to a stage and `response` for
//! the state it returned.

use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::data::{
    ContextMap, ControllerRequest, ControllerResponse, Document, MessageData, ProcessorResult,
    RecordData, SnapshotRef, DPP_VERSION,
};
use crate::error::SnapshotError;
use crate::storage::FileSystem;

const REQUEST_SUFFIX: &str = "_controller_request.json";
const RESPONSE_SUFFIX: &str = "_controller_response.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Request,
    Response,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Request => "request",
            SnapshotKind::Response => "response",
        }
    }
}

/// `R-` followed by 12 hex characters.
pub fn new_run_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("R-{}", &simple[simple.len() - 12..])
}

/// Request id of the stage at 1-based `position` within a run.
pub fn request_id(run_id: &str, position: usize) -> String {
    format!("{}-{:03}", run_id, position)
}

/// Where the response for a request file is written: a name ending in
/// `request.json` gets `response.json`, anything else `{stem}_response.json`.
pub fn response_path_for(request_path: &str) -> String {
    if let Some(prefix) = request_path.strip_suffix("request.json") {
        return format!("{}response.json", prefix);
    }
    let (dir, file_name) = match request_path.rfind('/') {
        Some(idx) => (&request_path[..=idx], &request_path[idx + 1..]),
        None => ("", request_path),
    };
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    format!("{}{}_response.json", dir, stem)
}

pub struct SnapshotStore {
    storage: Arc<dyn FileSystem>,
    work_root: String,
}

impl SnapshotStore {
    pub fn new(storage: Arc<dyn FileSystem>, work_root: impl Into<String>) -> Self {
        let work_root = work_root.into().trim_end_matches('/').to_string();
        Self { storage, work_root }
    }

    pub fn work_root(&self) -> &str {
        &self.work_root
    }

    pub fn storage(&self) -> &Arc<dyn FileSystem> {
        &self.storage
    }

    pub fn run_dir(&self, run_id: &str) -> String {
        format!("{}/snapshots/{}", self.work_root, run_id)
    }

    pub fn request_file_path(&self, request_id: &str) -> String {
        format!("{}/{}{}", self.work_root, request_id, REQUEST_SUFFIX)
    }

    pub fn response_file_path(&self, request_id: &str) -> String {
        format!("{}/{}{}", self.work_root, request_id, RESPONSE_SUFFIX)
    }

    /// Empty envelope for one stage invocation of a run.
    pub fn new_request(&self, run_id: &str, request_id: &str) -> ControllerRequest {
        ControllerRequest {
            dpp_version: DPP_VERSION.to_string(),
            request_id: request_id.to_string(),
            snapshot_dir_root_path: self.run_dir(run_id),
            ..ControllerRequest::default()
        }
    }

    /// Persists the effective pipeline config of a run so that external
    /// executors can load the same stage settings.
    pub fn write_config(
        &self,
        run_id: &str,
        config: &PipelineConfig,
    ) -> Result<String, SnapshotError> {
        let path = format!("{}/pipeline_config.json", self.run_dir(run_id));
        self.write_json(&path, config)?;
        Ok(path)
    }

    /// Writes one snapshot triple per result and returns a copy of
    /// `envelope` whose records point at them.
    pub fn save_snapshots(
        &self,
        envelope: &ControllerRequest,
        results: &[ProcessorResult],
        kind: SnapshotKind,
    ) -> Result<ControllerRequest, SnapshotError> {
        let mut seen = HashSet::new();
        for result in results {
            let id = &result.document.document_id;
            if !id.is_empty() && !seen.insert(id.as_str()) {
                return Err(SnapshotError::DuplicateRecord(id.clone()));
            }
        }

        let dir = self.snapshot_dir(envelope);
        let mut records = Vec::with_capacity(results.len());
        for (idx, result) in results.iter().enumerate() {
            let document_key = if result.document.is_seed() {
                idx.to_string()
            } else {
                result.document.document_id.clone()
            };
            let stem = format!(
                "{}/{}_{}_{}",
                dir,
                envelope.request_id,
                kind.as_str(),
                document_key
            );

            let snapshot = SnapshotRef {
                document_data_file_path: format!("{}.document_data.json", stem),
                context_data_file_path: format!("{}.context_data.json", stem),
                message_data_file_path: Some(format!("{}.message_data.json", stem)),
            };
            self.write_json(&snapshot.document_data_file_path, &result.document)?;
            self.write_json(&snapshot.context_data_file_path, &result.context)?;
            if let Some(path) = &snapshot.message_data_file_path {
                self.write_json(path, &MessageData::from(result.messages.clone()))?;
            }

            records.push(RecordData {
                document_id: result.document.document_id.clone(),
                snapshot,
            });
        }

        debug!(
            "Saved {} {} snapshot(s) for {}",
            records.len(),
            kind.as_str(),
            envelope.request_id
        );

        Ok(ControllerRequest {
            records,
            snapshot_dir_root_path: dir,
            ..envelope.clone()
        })
    }

    /// Loads the state an envelope points at. An envelope without records
    /// but with a seed `context` yields a single seed pair.
    pub fn load_snapshots(
        &self,
        envelope: &ControllerRequest,
    ) -> Result<Vec<ProcessorResult>, SnapshotError> {
        if envelope.records.is_empty() {
            return Ok(envelope
                .context
                .as_ref()
                .map(|context| vec![ProcessorResult::new(Document::default(), context.clone())])
                .unwrap_or_default());
        }

        envelope
            .records
            .iter()
            .map(|record| -> Result<ProcessorResult, SnapshotError> {
                let document: Document =
                    self.read_json(&record.snapshot.document_data_file_path)?;
                let context: ContextMap = self.read_json(&record.snapshot.context_data_file_path)?;
                let messages = match &record.snapshot.message_data_file_path {
                    Some(path) if self.storage.exists(path)? => {
                        self.read_json::<MessageData>(path)?.messages
                    }
                    _ => Vec::new(),
                };
                Ok(ProcessorResult {
                    document,
                    context,
                    messages,
                })
            })
            .collect()
    }

    pub fn write_request(&self, request: &ControllerRequest) -> Result<String, SnapshotError> {
        let path = self.request_file_path(&request.request_id);
        self.write_json(&path, request)?;
        Ok(path)
    }

    pub fn write_response(&self, response: &ControllerResponse) -> Result<String, SnapshotError> {
        let path = self.response_file_path(&response.request_id);
        self.write_json(&path, response)?;
        Ok(path)
    }

    /// Writes an envelope to an explicit path, e.g. next to a request file
    /// that lives outside the work root.
    pub fn write_envelope(
        &self,
        path: &str,
        envelope: &ControllerRequest,
    ) -> Result<(), SnapshotError> {
        self.write_json(path, envelope)
    }

    pub fn read_request(&self, path: &str) -> Result<ControllerRequest, SnapshotError> {
        self.read_json(path)
    }

    pub fn read_response(&self, path: &str) -> Result<ControllerResponse, SnapshotError> {
        self.read_json(path)
    }

    fn snapshot_dir(&self, envelope: &ControllerRequest) -> String {
        if envelope.snapshot_dir_root_path.is_empty() {
            format!("{}/snapshots/{}", self.work_root, envelope.request_id)
        } else {
            envelope.snapshot_dir_root_path.trim_end_matches('/').to_string()
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.storage.write(path, &bytes)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SnapshotError> {
        let bytes = self.storage.read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| SnapshotError::Malformed {
            path: path.to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Message;
    use crate::storage::LocalFileSystem;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(temp_dir: &TempDir) -> SnapshotStore {
        SnapshotStore::new(
            Arc::new(LocalFileSystem::new(temp_dir.path())),
            "/data/temp/work/docpipe/",
        )
    }

    fn sample_result(doc: Document) -> ProcessorResult {
        let mut context = ContextMap::new();
        context.insert("Preprocessor", json!({"lang": "en"}));
        context.insert("TextLoader", json!({"char_count": 12}));
        ProcessorResult::new(doc, context).with_message(Message::no_records_found("none"))
    }

    #[test]
    fn test_run_and_request_ids() {
        let run_id = new_run_id();
        assert_eq!(run_id.len(), 14);
        assert!(run_id.starts_with("R-"));
        assert!(run_id[2..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(request_id("R-abc", 2), "R-abc-002");
    }

    #[test]
    fn test_response_path_naming() {
        assert_eq!(
            response_path_for("/w/R-1-001_controller_request.json"),
            "/w/R-1-001_controller_response.json"
        );
        assert_eq!(response_path_for("/w/job.json"), "/w/job_response.json");
        assert_eq!(response_path_for("job"), "job_response.json");
    }

    #[test]
    fn test_layout_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        assert_eq!(store.work_root(), "/data/temp/work/docpipe");
        assert_eq!(
            store.request_file_path("R-1-001"),
            "/data/temp/work/docpipe/R-1-001_controller_request.json"
        );
        assert_eq!(store.run_dir("R-1"), "/data/temp/work/docpipe/snapshots/R-1");
    }

    #[test]
    fn test_save_then_load_reproduces_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let results = vec![
            sample_result(Document::for_file("/data/in/a.txt")),
            sample_result(Document::for_file("/data/in/b.txt")),
        ];

        let envelope = store.new_request("R-1", "R-1-001");
        let saved = store
            .save_snapshots(&envelope, &results, SnapshotKind::Request)
            .unwrap();
        assert_eq!(saved.records.len(), 2);
        assert!(saved.records[0]
            .snapshot
            .document_data_file_path
            .ends_with(&format!(
                "R-1-001_request_{}.document_data.json",
                results[0].document.document_id
            )));

        let loaded = store.load_snapshots(&saved).unwrap();
        assert_eq!(loaded, results);
        assert_eq!(
            loaded[0].context.keys().collect::<Vec<_>>(),
            vec!["Preprocessor", "TextLoader"]
        );
    }

    #[test]
    fn test_seed_documents_use_record_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let envelope = store.new_request("R-1", "R-1-001");

        let saved = store
            .save_snapshots(
                &envelope,
                &[ProcessorResult::new(Document::default(), ContextMap::new())],
                SnapshotKind::Response,
            )
            .unwrap();
        assert!(saved.records[0]
            .snapshot
            .context_data_file_path
            .ends_with("R-1-001_response_0.context_data.json"));
    }

    #[test]
    fn test_duplicate_document_ids_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let doc = Document::new();
        let results = vec![sample_result(doc.clone()), sample_result(doc)];

        let result = store.save_snapshots(
            &store.new_request("R-1", "R-1-001"),
            &results,
            SnapshotKind::Request,
        );
        assert!(matches!(result, Err(SnapshotError::DuplicateRecord(_))));
    }

    #[test]
    fn test_load_without_records_uses_seed_context() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let mut request = store.new_request("R-1", "R-1-001");
        assert!(store.load_snapshots(&request).unwrap().is_empty());

        let mut seed = ContextMap::new();
        seed.insert("Preprocessor", json!({}));
        request.context = Some(seed.clone());

        let loaded = store.load_snapshots(&request).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].document.is_seed());
        assert_eq!(loaded[0].context, seed);
    }

    #[test]
    fn test_request_and_response_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let request = store.new_request("R-1", "R-1-001");

        let request_path = store.write_request(&request).unwrap();
        assert_eq!(store.read_request(&request_path).unwrap(), request);

        let response_path = store.write_response(&request).unwrap();
        assert_eq!(response_path, response_path_for(&request_path));
        assert_eq!(store.read_response(&response_path).unwrap(), request);
    }

    #[test]
    fn test_malformed_artifact_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store.storage().write("/bad.json", b"{ nope").unwrap();

        match store.read_response("/bad.json") {
            Err(SnapshotError::Malformed { path, .. }) => assert_eq!(path, "/bad.json"),
            other => panic!("Expected Malformed error, got {:?}", other),
        }
    }
}
