use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standard, resolvable metadata about the file a document came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardData {
    pub filepath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_dtm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_dtm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl StandardData {
    /// Builds standard data for a logical file path, deriving the file name
    /// and MIME type from the path.
    pub fn from_path(filepath: impl Into<String>) -> Self {
        let filepath = filepath.into();
        let filename = filepath
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let mime_type = mime_guess::from_path(&filepath)
            .first()
            .map(|mime| mime.essence_str().to_string());

        Self {
            filepath,
            filename,
            mime_type,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_data: Option<StandardData>,
    /// Free-form fields extracted by stages.
    #[serde(default)]
    pub extracted: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    #[serde(default)]
    pub table_data: Vec<Value>,
    #[serde(default)]
    pub key_value_data: Vec<Value>,
    #[serde(default)]
    pub heading_data: Vec<Value>,
    #[serde(default)]
    pub page_header_data: Vec<Value>,
    #[serde(default)]
    pub page_footer_data: Vec<Value>,
    #[serde(default)]
    pub other_data: Vec<Value>,
    #[serde(default)]
    pub segment_data: Vec<Value>,
}

/// One logical unit of work flowing through the pipeline.
///
/// `document_id` is assigned once by the stage that discovers the input and
/// never changes afterwards. The payload sections are filled in additively by
/// later stages. `Document::default()` is the empty seed handed to a
/// discovery stage before any input exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub page_data: Vec<Value>,
    #[serde(default)]
    pub text_data: Vec<Value>,
    #[serde(default)]
    pub raw_data: RawData,
    #[serde(default)]
    pub business_attribute_data: Vec<Value>,
}

impl Document {
    /// Creates a document with a freshly generated id.
    pub fn new() -> Self {
        Self {
            document_id: format!("D-{}", uuid::Uuid::new_v4()),
            ..Self::default()
        }
    }

    /// Creates a document for a discovered file.
    pub fn for_file(filepath: impl Into<String>) -> Self {
        let mut document = Self::new();
        document.metadata.standard_data = Some(StandardData::from_path(filepath));
        document
    }

    /// True for the empty seed document that precedes discovery.
    pub fn is_seed(&self) -> bool {
        self.document_id.is_empty()
    }

    pub fn filepath(&self) -> Option<&str> {
        self.metadata
            .standard_data
            .as_ref()
            .map(|standard| standard.filepath.as_str())
    }
}
