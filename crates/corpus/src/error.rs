use thiserror::Error;

/// Result type for corpus operations
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Errors raised while loading or querying corpus metadata
#[derive(Error, Debug)]
pub enum CorpusError {
    /// IO error occurred
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Metadata file could not be (de)serialized
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Two rows share a primary key
    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    /// Invalid character offsets on a document record
    #[error("Invalid offsets for {doc_id}: start={start}, end={end}")]
    InvalidOffsets {
        doc_id: String,
        start: usize,
        end: usize,
    },

    /// Backend failure
    #[error("{0}")]
    Other(String),
}

impl CorpusError {
    /// Create a duplicate-id error
    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            kind,
            id: id.into(),
        }
    }
}
