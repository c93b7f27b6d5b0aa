//! Provenance metadata attached to every stored chunk.

use serde::{Deserialize, Serialize};

use crate::chunking::DocChunk;

/// Minimal provenance record used for citations at query time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Originating filename or URL, verbatim.
    pub filename: Option<String>,
    /// Sorted, deduplicated page numbers spanned by the chunk. `None`
    /// when no composing fragment carried a page, never `Some(vec![])`.
    pub page_numbers: Option<Vec<u32>>,
    /// Nearest enclosing heading at the chunk's start.
    pub title: Option<String>,
}

impl ChunkMetadata {
    /// Derives metadata for a chunk of the named source. Pure.
    pub fn aggregate(source: &str, chunk: &DocChunk) -> Self {
        let mut pages = chunk.pages.clone();
        pages.sort_unstable();
        pages.dedup();

        Self {
            filename: Some(source.to_string()),
            page_numbers: if pages.is_empty() { None } else { Some(pages) },
            title: chunk.nearest_heading().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(pages: &[u32], headings: &[&str]) -> DocChunk {
        DocChunk {
            text: "body".to_string(),
            token_count: 1,
            pages: pages.to_vec(),
            headings: headings.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn pages_are_sorted_and_deduplicated() {
        let meta = ChunkMetadata::aggregate("report.pdf", &chunk(&[3, 1, 3, 2], &[]));
        assert_eq!(meta.filename.as_deref(), Some("report.pdf"));
        assert_eq!(meta.page_numbers, Some(vec![1, 2, 3]));
    }

    #[test]
    fn missing_pages_become_none_not_empty() {
        let meta = ChunkMetadata::aggregate("https://example.com", &chunk(&[], &[]));
        assert_eq!(meta.page_numbers, None);
        assert_eq!(meta.title, None);
    }

    #[test]
    fn title_is_the_nearest_enclosing_heading() {
        let meta = ChunkMetadata::aggregate("doc", &chunk(&[1], &["Root", "Section 1"]));
        assert_eq!(meta.title.as_deref(), Some("Section 1"));
    }
}
