//! Token counting for chunk budgets.
//!
//! Chunk budgets are enforced against the embedding model's own
//! tokenizer: overshooting its context limit is a hard failure
//! downstream, not a truncation. [`TiktokenCounter`] (behind the
//! default `tiktoken` feature) matches the OpenAI embedding models;
//! [`HeuristicTokenCounter`] is a dependency-free approximation for
//! environments where exactness does not matter.

use crate::types::PipelineError;

/// Counts tokens the way the target embedding model would.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Rough counter assuming ~4 characters per token. Overestimates more
/// often than it underestimates, which keeps chunks on the safe side of
/// the budget, but must not be used where the limit is load-bearing.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Exact counter backed by the `cl100k_base` encoding used by
/// `text-embedding-3-large` and its siblings.
#[cfg(feature = "tiktoken")]
pub struct TiktokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenCounter {
    pub fn cl100k() -> Result<Self, PipelineError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|err| PipelineError::Chunking(err.to_string()))?;
        Ok(Self { bpe })
    }
}

#[cfg(feature = "tiktoken")]
impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_rounds_up() {
        let counter = HeuristicTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("ab"), 1);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
    }

    #[cfg(feature = "tiktoken")]
    #[test]
    fn tiktoken_counts_real_tokens() {
        let counter = TiktokenCounter::cl100k().unwrap();
        assert_eq!(counter.count(""), 0);
        assert!(counter.count("hello world") >= 2);
    }
}
