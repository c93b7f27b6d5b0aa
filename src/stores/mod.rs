//! Vector storage for embedded chunks.
//!
//! One SQLite file (with the `sqlite-vec` extension) backs any number of
//! named tables. Each table pairs a plain rowid table holding text and
//! provenance with a `vec0` virtual table holding the embeddings, joined
//! on rowid:
//!
//! ```text
//!  {name}              {name}_embeddings
//!  ┌──────────────┐    ┌──────────────────────┐
//!  │ id           │    │ rowid                │
//!  │ text         │◄──►│ embedding float[D]   │
//!  │ filename     │    └──────────────────────┘
//!  │ page_numbers │       vec_distance_cosine
//!  │ title        │
//!  └──────────────┘
//! ```
//!
//! Store handles are plain values passed into the pipeline components;
//! lifecycle belongs to the enclosing application, not to this module.

pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::metadata::ChunkMetadata;

pub use sqlite::{ChunkTable, VectorStore};

/// Table lifecycle on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the table if absent, keep existing rows. Re-ingesting the
    /// same document appends duplicate rows; no dedup key exists at
    /// this layer.
    Append,
    /// Drop and recreate the table. Destructive; used for full reindex.
    Overwrite,
}

/// A chunk ready for persistence: text, vector, and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    /// Embedding of `text`; length must equal the table dimensionality.
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// One ranked result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query; higher ranks first.
    pub similarity: f32,
}
