//! Embedding providers.
//!
//! The pipeline only ever talks to [`EmbeddingProvider`]; vectors come
//! back in input order with a fixed dimensionality. The production path
//! adapts any [`rig`] embedding model (OpenAI `text-embedding-3-large`
//! at 3072 dimensions in the reference deployment); tests and demos use
//! the deterministic [`MockEmbeddingProvider`].

use async_trait::async_trait;
use parking_lot::Mutex;
use rig::embeddings::embedding::{Embedding, EmbeddingModel};

use crate::types::PipelineError;

/// Produces fixed-dimensionality vectors for chunk and query text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider label used in logs and telemetry.
    fn name(&self) -> &str;

    /// Output dimensionality; constant for the provider's lifetime.
    fn ndims(&self) -> usize;

    /// Embeds a batch. The returned vectors match `texts` in order and
    /// length; anything else is an error, never a silent substitution.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            PipelineError::Embedding("provider returned no vector for query".to_string())
        })
    }
}

/// Adapter from any [`rig::embeddings::embedding::EmbeddingModel`].
///
/// Requests are sliced into the model's `MAX_DOCUMENTS` windows so
/// provider batch limits hold regardless of caller batch sizes.
pub struct RigEmbeddingProvider<M> {
    model: M,
    name: String,
}

impl<M> RigEmbeddingProvider<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M, name: impl Into<String>) -> Self {
        Self {
            model,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<M> EmbeddingProvider for RigEmbeddingProvider<M>
where
    M: EmbeddingModel + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn ndims(&self) -> usize {
        self.model.ndims()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for window in texts.chunks(M::MAX_DOCUMENTS.max(1)) {
            let embeddings: Vec<Embedding> = self
                .model
                .embed_texts(window.to_vec())
                .await
                .map_err(|err| PipelineError::Embedding(err.to_string()))?;

            if embeddings.len() != window.len() {
                return Err(PipelineError::Embedding(format!(
                    "provider returned {} vectors for {} inputs",
                    embeddings.len(),
                    window.len()
                )));
            }

            vectors.extend(
                embeddings
                    .into_iter()
                    .map(|e| e.vec.into_iter().map(|v| v as f32).collect()),
            );
        }

        Ok(vectors)
    }
}

/// Deterministic provider for tests and offline demos: identical text
/// always maps to the identical vector, so ranking assertions hold.
pub struct MockEmbeddingProvider {
    ndims: usize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::with_ndims(8)
    }

    pub fn with_ndims(ndims: usize) -> Self {
        Self {
            ndims,
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Sizes of the batches received so far, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    fn hash_to_vec(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        (0..self.ndims)
            .map(|i| {
                let bits = seed.rotate_left((i as u32 % 63) + 1) ^ ((i as u64) << 17);
                ((bits % 10_000) as f32 / 10_000.0) + 0.01
            })
            .collect()
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn ndims(&self) -> usize {
        self.ndims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        self.batch_sizes.lock().push(texts.len());
        Ok(texts.iter().map(|text| self.hash_to_vec(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_is_deterministic_and_order_preserving() {
        let provider = MockEmbeddingProvider::new();
        let texts = vec![
            "Hello world".to_string(),
            "Goodbye world".to_string(),
            "Hello world".to_string(),
        ];

        let first = provider.embed_batch(&texts).await.unwrap();
        let second = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
        assert!(first.iter().all(|v| v.len() == provider.ndims()));
    }

    #[tokio::test]
    async fn single_embed_matches_batch() {
        let provider = MockEmbeddingProvider::with_ndims(4);
        let via_batch = provider
            .embed_batch(&["query".to_string()])
            .await
            .unwrap()
            .remove(0);
        let direct = provider.embed("query").await.unwrap();
        assert_eq!(via_batch, direct);
    }

    #[tokio::test]
    async fn batch_sizes_are_recorded() {
        let provider = MockEmbeddingProvider::new();
        provider.embed_batch(&["a".to_string()]).await.unwrap();
        provider
            .embed_batch(&["b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(provider.batch_sizes(), vec![1, 2]);
    }
}
