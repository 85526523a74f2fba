//! Records shared by every stage: the document, the accumulating context
//! map, diagnostic messages and the controller request/response envelope.

pub mod context;
pub mod controller;
pub mod document;
pub mod message;
pub mod result;

pub use context::ContextMap;
pub use controller::{
    ControllerRequest, ControllerResponse, ExecuteEnvelope, ProcessorFilter, RecordData,
    SnapshotRef,
};
pub use document::{Document, DocumentMetadata, RawData, StandardData};
pub use message::{Message, MessageCode, MessageData, MessageType};
pub use result::ProcessorResult;

/// Version stamped into controller requests and responses.
pub const DPP_VERSION: &str = env!("CARGO_PKG_VERSION");
