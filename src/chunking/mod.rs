//! Token-budgeted chunk assembly.
//!
//! Fragments arrive already split along structural boundaries (pages,
//! headings). The chunker enforces the embedding model's token budget on
//! top of that structure: oversized fragments are subdivided at sentence
//! boundaries, and small neighbors under the same heading are merged
//! back together so the index is not littered with one-line chunks.
//! A chunk never exceeds the budget and never spans two documents.

pub mod tokenizer;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::document::Fragment;
use crate::types::PipelineError;
use tokenizer::TokenCounter;

/// Hard token ceiling per chunk: the `text-embedding-3-large` input limit.
pub const MAX_TOKENS: usize = 8191;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Upper bound on tokens per chunk. Defaults to [`MAX_TOKENS`].
    pub max_tokens: usize,
    /// Merge adjacent fragments that share the same nearest heading.
    pub merge_peers: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: MAX_TOKENS,
            merge_peers: true,
        }
    }
}

/// A token-bounded unit of text assembled from one or more fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocChunk {
    pub text: String,
    pub token_count: usize,
    /// Pages spanned, in source order, duplicates preserved.
    pub pages: Vec<u32>,
    /// Heading trail of the chunk's first fragment, root to nearest.
    pub headings: Vec<String>,
}

impl DocChunk {
    /// Nearest enclosing heading, if any.
    pub fn nearest_heading(&self) -> Option<&str> {
        self.headings.last().map(String::as_str)
    }
}

/// Splits and merges fragments into budget-respecting chunks.
pub struct Chunker {
    config: ChunkerConfig,
    counter: Arc<dyn TokenCounter>,
}

impl Chunker {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            config: ChunkerConfig::default(),
            counter,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ChunkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks one document's fragments. An empty fragment list yields an
    /// empty chunk list.
    pub fn chunk(&self, fragments: &[Fragment]) -> Result<Vec<DocChunk>, PipelineError> {
        if self.config.max_tokens == 0 {
            return Err(PipelineError::Chunking(
                "max_tokens must be positive".to_string(),
            ));
        }

        let mut pieces = Vec::new();
        for fragment in fragments {
            let tokens = self.counter.count(&fragment.text);
            if tokens <= self.config.max_tokens {
                pieces.push(DocChunk {
                    text: fragment.text.clone(),
                    token_count: tokens,
                    pages: fragment.page.into_iter().collect(),
                    headings: fragment.headings.clone(),
                });
                continue;
            }

            for part in self.split_oversized(&fragment.text) {
                let token_count = self.counter.count(&part);
                pieces.push(DocChunk {
                    text: part,
                    token_count,
                    pages: fragment.page.into_iter().collect(),
                    headings: fragment.headings.clone(),
                });
            }
        }

        if self.config.merge_peers {
            Ok(self.merge_peers(pieces))
        } else {
            Ok(pieces)
        }
    }

    /// Greedy sentence packing for a fragment over budget. Falls back to
    /// word bounds for a single over-budget sentence, and to scalar
    /// boundaries for degenerate token-dense runs.
    fn split_oversized(&self, text: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current = String::new();

        for sentence in text.split_sentence_bounds() {
            if self.counter.count(sentence) > self.config.max_tokens {
                self.flush(&mut parts, &mut current);
                self.pack_segments(sentence.split_word_bounds(), &mut parts, &mut current);
                continue;
            }
            self.append_segment(sentence, &mut parts, &mut current);
        }

        self.flush(&mut parts, &mut current);
        parts
    }

    fn pack_segments<'a>(
        &self,
        segments: impl Iterator<Item = &'a str>,
        parts: &mut Vec<String>,
        current: &mut String,
    ) {
        for segment in segments {
            if self.counter.count(segment) > self.config.max_tokens {
                self.flush(parts, current);
                self.pack_scalars(segment, parts, current);
                continue;
            }
            self.append_segment(segment, parts, current);
        }
    }

    fn pack_scalars(&self, segment: &str, parts: &mut Vec<String>, current: &mut String) {
        for ch in segment.chars() {
            current.push(ch);
            if self.counter.count(current) > self.config.max_tokens {
                let overflow = current.pop();
                if current.trim().is_empty() {
                    // a single scalar cannot be subdivided further
                    if let Some(ch) = overflow {
                        current.push(ch);
                    }
                    continue;
                }
                self.flush(parts, current);
                if let Some(ch) = overflow {
                    current.push(ch);
                }
            }
        }
    }

    fn append_segment(&self, segment: &str, parts: &mut Vec<String>, current: &mut String) {
        if !current.is_empty() {
            let candidate_tokens = self.counter.count(&format!("{current}{segment}"));
            if candidate_tokens > self.config.max_tokens {
                self.flush(parts, current);
            }
        }
        current.push_str(segment);
    }

    fn flush(&self, parts: &mut Vec<String>, current: &mut String) {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
        current.clear();
    }

    /// Merges adjacent pieces whose nearest enclosing heading matches,
    /// re-counting the joined text so the budget holds after merging.
    fn merge_peers(&self, pieces: Vec<DocChunk>) -> Vec<DocChunk> {
        let mut merged: Vec<DocChunk> = Vec::new();

        for piece in pieces {
            if let Some(last) = merged.last_mut() {
                if last.headings.last() == piece.headings.last() {
                    let candidate = format!("{}\n{}", last.text, piece.text);
                    let token_count = self.counter.count(&candidate);
                    if token_count <= self.config.max_tokens {
                        last.text = candidate;
                        last.token_count = token_count;
                        last.pages.extend(piece.pages);
                        continue;
                    }
                }
            }
            merged.push(piece);
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word; keeps budgets legible.
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn chunker(max_tokens: usize) -> Chunker {
        Chunker::new(Arc::new(WordCounter)).with_config(ChunkerConfig {
            max_tokens,
            merge_peers: true,
        })
    }

    fn fragment(text: &str, page: Option<u32>, headings: &[&str]) -> Fragment {
        Fragment {
            text: text.to_string(),
            page,
            headings: headings.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunker(10).chunk(&[]).unwrap().is_empty());
    }

    #[test]
    fn zero_budget_is_a_config_error() {
        let err = chunker(0).chunk(&[fragment("x", None, &[])]).unwrap_err();
        assert!(matches!(err, PipelineError::Chunking(_)));
    }

    #[test]
    fn single_fragment_under_budget_is_one_chunk() {
        let chunks = chunker(10)
            .chunk(&[fragment("three short words", Some(1), &["H"])])
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "three short words");
        assert_eq!(chunks[0].token_count, 3);
        assert_eq!(chunks[0].pages, vec![1]);
    }

    #[test]
    fn peers_under_same_heading_merge() {
        let chunks = chunker(10)
            .chunk(&[
                fragment("Body A", Some(2), &["Section 1"]),
                fragment("Body B", Some(3), &["Section 1"]),
            ])
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Body A\nBody B");
        assert_eq!(chunks[0].token_count, 4);
        assert_eq!(chunks[0].pages, vec![2, 3]);
        assert_eq!(chunks[0].nearest_heading(), Some("Section 1"));
    }

    #[test]
    fn different_headings_do_not_merge() {
        let chunks = chunker(10)
            .chunk(&[
                fragment("Intro", Some(1), &[]),
                fragment("Body A", Some(2), &["Section 1"]),
                fragment("Body B", Some(3), &["Section 1"]),
            ])
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Intro");
        assert_eq!(chunks[0].nearest_heading(), None);
        assert_eq!(chunks[1].text, "Body A\nBody B");
    }

    #[test]
    fn merge_stops_at_the_budget() {
        let chunks = chunker(3)
            .chunk(&[
                fragment("one two", None, &["H"]),
                fragment("three four", None, &["H"]),
            ])
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.token_count <= 3));
    }

    #[test]
    fn merge_can_be_disabled() {
        let chunks = Chunker::new(Arc::new(WordCounter))
            .with_config(ChunkerConfig {
                max_tokens: 10,
                merge_peers: false,
            })
            .chunk(&[
                fragment("Body A", Some(2), &["S"]),
                fragment("Body B", Some(3), &["S"]),
            ])
            .unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn oversized_fragment_is_subdivided_within_budget() {
        let text = "First sentence here. Second sentence follows. Third one closes.";
        let chunks = chunker(4).chunk(&[fragment(text, Some(7), &["Big"])]).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 4, "over budget: {:?}", chunk.text);
            assert_eq!(chunk.pages, vec![7]);
            assert_eq!(chunk.nearest_heading(), Some("Big"));
        }
        let rejoined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        for word in text.split_whitespace() {
            assert!(rejoined.contains(word.trim_end_matches('.')));
        }
    }

    #[test]
    fn giant_sentence_splits_at_word_bounds() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = chunker(3).chunk(&[fragment(text, None, &[])]).unwrap();
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.token_count <= 3));
    }

    #[test]
    fn budget_holds_for_every_chunk() {
        let fragments: Vec<Fragment> = (0..20)
            .map(|i| {
                fragment(
                    "word repeated several times over and over again",
                    Some(i + 1),
                    if i % 2 == 0 { &["A"] } else { &["B"] },
                )
            })
            .collect();

        for budget in [2, 5, 9, 40] {
            let chunks = chunker(budget).chunk(&fragments).unwrap();
            assert!(chunks.iter().all(|c| c.token_count <= budget));
        }
    }
}
