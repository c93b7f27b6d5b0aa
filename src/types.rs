//! Shared error type for the chunking and indexing pipeline.

use thiserror::Error;

/// Errors surfaced by pipeline components.
///
/// Conversion and chunking failures are per-document: the ingestion
/// pipeline catches them, records the document in the run report, and
/// keeps going. Embedding, storage, and schema failures abort the
/// request that triggered them.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A document could not be converted into a [`crate::document::ParsedDocument`].
    #[error("document conversion failed: {0}")]
    Conversion(String),

    /// Chunking a single document's fragments failed.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// An embedding request failed. Never substituted with zero vectors.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// The vector store rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored vector dimensionality disagrees with the embedder in use.
    #[error("vector dimensionality mismatch: table holds {expected}, embedder produced {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    /// A document or source reference is malformed.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// An HTTP fetch failed while resolving a URL source.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Filesystem access failed while reading a source or cache entry.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
