use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocpipeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read pipeline config '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to parse pipeline config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Pipeline config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Unknown processor '{name}'")]
    UnknownProcessor { name: String },

    #[error("Duplicate stage name '{name}' in processor_list")]
    DuplicateStage { name: String },

    #[error("Invalid transport for stage '{name}': {reason}")]
    InvalidTransport { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Path '{0}' escapes the storage root")]
    PathTraversal(String),

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list '{path}': {source}")]
    List {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Malformed snapshot artifact '{path}': {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Duplicate records found for document_id: {0}")]
    DuplicateRecord(String),
}

/// Failure of a hybrid stage's integration step. Each variant maps to its
/// own message code so that operators can tell transport failures apart
/// from failures inside the stage.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("process launch failed: {0}")]
    Launch(String),

    #[error("process exited with status {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("executor did not finish within {0:?}")]
    Timeout(std::time::Duration),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("response parsing failed: {0}")]
    Response(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Failure raised by a stage. Its `Display` is the bare failure message,
/// which becomes the text of the UNHANDLED_EXCEPTION message.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{0}")]
    Message(String),

    #[error("missing required setting '{0}'")]
    MissingSetting(String),

    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StageError {
    pub fn msg(message: impl Into<String>) -> Self {
        StageError::Message(message.into())
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Caller supplied {contexts} context(s) for {documents} document(s)")]
    InputMismatch { documents: usize, contexts: usize },

    #[error("Without documents at most one seed context is accepted, got {0}")]
    TooManySeedContexts(usize),

    #[error("Failed to prepare run directory: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Failed to read request '{path}': {source}")]
    ReadRequest {
        path: String,
        #[source]
        source: SnapshotError,
    },

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Request is missing '{0}'")]
    MissingField(&'static str),

    #[error("Processor filter may specify includes OR excludes, not both")]
    InvalidFilter,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Pipeline execution task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, DocpipeError>;
