//! Embeds chunk batches and persists them as table records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunking::DocChunk;
use crate::embeddings::EmbeddingProvider;
use crate::metadata::ChunkMetadata;
use crate::stores::{ChunkRecord, ChunkTable};
use crate::types::PipelineError;

/// A chunk paired with the source document it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcedChunk {
    pub source: String,
    pub chunk: DocChunk,
}

/// Writes embedded chunks into a [`ChunkTable`].
///
/// Embedding calls dominate ingestion latency, so chunks are embedded in
/// batches rather than one request per chunk. A failing batch propagates
/// its error; batches already written stay in the table.
pub struct Indexer {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl Indexer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            batch_size: 64,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embeds and persists `chunks`, returning rows actually written.
    /// Whitespace-only chunks are logged and skipped, never stored.
    pub async fn index_chunks(
        &self,
        table: &ChunkTable,
        chunks: &[SourcedChunk],
    ) -> Result<usize, PipelineError> {
        if self.provider.ndims() != table.dims() {
            return Err(PipelineError::SchemaMismatch {
                expected: table.dims(),
                actual: self.provider.ndims(),
            });
        }

        let (kept, skipped): (Vec<&SourcedChunk>, Vec<&SourcedChunk>) = chunks
            .iter()
            .partition(|item| !item.chunk.text.trim().is_empty());
        if !skipped.is_empty() {
            warn!(
                count = skipped.len(),
                "skipping whitespace-only chunks during indexing"
            );
        }

        let mut written = 0;
        for batch in kept.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|item| item.chunk.text.clone()).collect();
            let vectors = self.provider.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(PipelineError::Embedding(format!(
                    "expected {} vectors, provider returned {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let records: Vec<ChunkRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(item, embedding)| ChunkRecord {
                    id: Uuid::new_v4().to_string(),
                    text: item.chunk.text.clone(),
                    embedding,
                    metadata: ChunkMetadata::aggregate(&item.source, &item.chunk),
                })
                .collect();

            written += table.add(records).await?;
        }

        debug!(
            table = table.name(),
            rows = written,
            provider = self.provider.name(),
            "indexed chunk batch"
        );
        Ok(written)
    }
}
