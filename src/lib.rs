//! ```text
//! Files / URLs ──► ingestion::convert ──► document::ParsedDocument
//!                                              │
//!                     document::extract_fragments
//!                                              │
//!                         chunking::Chunker ──► DocChunk stream
//!                                              │
//!          metadata::ChunkMetadata ◄── indexing::Indexer ──► embeddings
//!                                              │
//!                               stores::sqlite::ChunkTable (sqlite-vec)
//!                                              │
//!              retrieval::retrieve_context ──► cited context string
//! ```
//!
//! Library for turning heterogeneous documents into token-bounded,
//! provenance-tagged chunks and serving them back as grounded context
//! for a language model. Invoked as plain functions and handles from an
//! enclosing application; no CLI or network surface of its own.

pub mod chunking;
pub mod document;
pub mod embeddings;
pub mod indexing;
pub mod ingestion;
pub mod metadata;
pub mod retrieval;
pub mod stores;
pub mod types;

pub use chunking::{Chunker, ChunkerConfig, DocChunk, MAX_TOKENS};
pub use document::{DocumentShape, Fragment, ParsedDocument, extract_fragments};
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, RigEmbeddingProvider};
pub use indexing::{Indexer, SourcedChunk};
pub use ingestion::{DocumentSource, IngestionPipeline, IngestionReport};
pub use metadata::ChunkMetadata;
pub use retrieval::{answer_prompt, retrieve_context};
pub use stores::{ChunkRecord, ChunkTable, SearchHit, VectorStore, WriteMode};
pub use types::PipelineError;
