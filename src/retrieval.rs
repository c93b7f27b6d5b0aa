//! Query-time retrieval and context assembly.
//!
//! Retrieval embeds the user's query with the same provider family the
//! index was built with, ranks stored chunks by cosine similarity, and
//! renders the winners into a single context string with inline
//! citations. The enclosing application hands that string (usually via
//! [`answer_prompt`]) to its language model.

use tracing::debug;

use crate::embeddings::EmbeddingProvider;
use crate::stores::{ChunkTable, SearchHit};
use crate::types::PipelineError;

/// Embeds `query`, searches `table`, and formats the top-`k` hits.
///
/// A query-embedding failure is fatal to the request. An empty index
/// yields an empty string, not an error.
pub async fn retrieve_context(
    provider: &dyn EmbeddingProvider,
    table: &ChunkTable,
    query: &str,
    k: usize,
) -> Result<String, PipelineError> {
    let embedding = provider.embed(query).await?;
    let hits = table.search(&embedding, k).await?;
    debug!(
        query_len = query.len(),
        hits = hits.len(),
        table = table.name(),
        "retrieved context chunks"
    );
    Ok(format_context(&hits))
}

/// Renders ranked hits: chunk text, a `Source:` line from filename and
/// pages (omitted when both are absent), a `Title:` line (omitted when
/// absent), blank-line separated in rank order.
pub fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(format_hit)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_hit(hit: &SearchHit) -> String {
    let mut rendered = hit.text.clone();

    let mut source_parts = Vec::new();
    if let Some(filename) = &hit.metadata.filename {
        source_parts.push(filename.clone());
    }
    if let Some(pages) = &hit.metadata.page_numbers {
        if !pages.is_empty() {
            let listed = pages
                .iter()
                .map(|page| page.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            source_parts.push(format!("p. {listed}"));
        }
    }
    if !source_parts.is_empty() {
        rendered.push_str("\nSource: ");
        rendered.push_str(&source_parts.join(" - "));
    }

    if let Some(title) = &hit.metadata.title {
        rendered.push_str("\nTitle: ");
        rendered.push_str(title);
    }

    rendered
}

/// System prompt instructing the model to answer strictly from the
/// retrieved context, with an Answer / Sources / Reasoning structure.
pub fn answer_prompt(context: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions based on the provided context.\n\
         \n\
         Always respond with three sections:\n\
         \n\
         **Answer** - a clear reply to the user's question.\n\
         **Sources** - list the filenames and page numbers where the information was found.\n\
         **Reasoning** - restate the question, mention the relevant snippets you found, and \
         explain how you connected them to form the answer.\n\
         \n\
         Do not answer from outside knowledge; explain how you reasoned from the retrieved \
         text.\n\
         \n\
         Context:\n\
         {context}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ChunkMetadata;

    fn hit(text: &str, filename: Option<&str>, pages: Option<Vec<u32>>, title: Option<&str>) -> SearchHit {
        SearchHit {
            id: "id".to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                filename: filename.map(str::to_string),
                page_numbers: pages,
                title: title.map(str::to_string),
            },
            similarity: 0.9,
        }
    }

    #[test]
    fn full_citation_renders_source_and_title() {
        let rendered = format_context(&[hit(
            "Body text.",
            Some("report.pdf"),
            Some(vec![2, 3]),
            Some("Section 1"),
        )]);
        assert_eq!(
            rendered,
            "Body text.\nSource: report.pdf - p. 2, 3\nTitle: Section 1"
        );
    }

    #[test]
    fn absent_metadata_lines_are_omitted() {
        let rendered = format_context(&[hit("Bare text.", None, None, None)]);
        assert_eq!(rendered, "Bare text.");

        let rendered = format_context(&[hit("Untitled.", Some("a.txt"), None, None)]);
        assert_eq!(rendered, "Untitled.\nSource: a.txt");
    }

    #[test]
    fn hits_join_with_blank_lines_in_rank_order() {
        let rendered = format_context(&[
            hit("First.", Some("a"), None, None),
            hit("Second.", Some("b"), None, None),
        ]);
        assert_eq!(rendered, "First.\nSource: a\n\nSecond.\nSource: b");
    }

    #[test]
    fn empty_hits_render_an_empty_context() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn answer_prompt_embeds_the_context() {
        let prompt = answer_prompt("CONTEXT GOES HERE");
        assert!(prompt.contains("CONTEXT GOES HERE"));
        assert!(prompt.contains("**Answer**"));
        assert!(prompt.contains("**Sources**"));
    }
}
