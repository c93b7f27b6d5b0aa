//! Offline walkthrough of the full pipeline: ingest two documents into
//! a throwaway sqlite-vec table, then answer a query with cited context.
//!
//! Uses the deterministic mock embedder so it runs without credentials.
//! Swap in `RigEmbeddingProvider` over an OpenAI embedding model (e.g.
//! `text-embedding-3-large`, 3072 dims) for a real index.
//!
//! ```bash
//! cargo run --example pipeline_demo
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing_subscriber::FmtSubscriber;

use chunkmill::chunking::tokenizer::HeuristicTokenCounter;
use chunkmill::document::{DocumentShape, Element, Page, ParsedDocument};
use chunkmill::ingestion::DocumentConverter;
use chunkmill::{
    Chunker, DocumentSource, EmbeddingProvider, Indexer, IngestionPipeline,
    MockEmbeddingProvider, PipelineError, VectorStore, WriteMode, answer_prompt,
    retrieve_context,
};

/// Stand-in for a real converter service: hands back pre-parsed
/// documents keyed by source name.
struct DemoConverter;

#[async_trait]
impl DocumentConverter for DemoConverter {
    async fn convert(&self, source: &DocumentSource) -> Result<ParsedDocument, PipelineError> {
        match source.name().as_str() {
            "handbook.pdf" => Ok(ParsedDocument::new(
                "handbook.pdf",
                DocumentShape::Paged(vec![
                    Page::with_text(1, "Welcome to the team handbook."),
                    Page::with_elements(
                        2,
                        vec![
                            Element::heading(1, "Expenses"),
                            Element::text("Submit receipts within thirty days of purchase."),
                        ],
                    ),
                    Page::with_elements(
                        3,
                        vec![Element::text("Reimbursements are paid with the next payroll.")],
                    ),
                ]),
            )),
            "faq.txt" => Ok(ParsedDocument::new(
                "faq.txt",
                DocumentShape::Plain(
                    "Office hours are Tuesday and Thursday afternoons.".to_string(),
                ),
            )),
            other => Err(PipelineError::Conversion(format!("unknown source {other}"))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let subscriber = FmtSubscriber::builder().with_env_filter("info").finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let dir = std::env::temp_dir().join("chunkmill_demo");
    tokio::fs::create_dir_all(&dir).await?;
    let store = VectorStore::connect(dir.join("index.sqlite")).await?;

    let provider = Arc::new(MockEmbeddingProvider::with_ndims(64));
    let table = store
        .create_table("docling", provider.ndims(), WriteMode::Overwrite)
        .await?;

    let pipeline = IngestionPipeline::new(
        Arc::new(DemoConverter),
        Chunker::new(Arc::new(HeuristicTokenCounter)),
        Indexer::new(provider.clone()),
    );

    let report = pipeline
        .run(
            &table,
            &[
                DocumentSource::File("handbook.pdf".into()),
                DocumentSource::File("faq.txt".into()),
                DocumentSource::File("missing.docx".into()),
            ],
        )
        .await?;

    println!("Ingestion complete");
    println!("  documents converted: {}", report.documents_converted);
    println!("  chunks created     : {}", report.chunks_created);
    println!("  rows written       : {}", report.rows_written);
    for skipped in &report.skipped {
        println!("  skipped {} ({})", skipped.source, skipped.reason);
    }

    let query = "Submit receipts within thirty days of purchase.";
    let context = retrieve_context(provider.as_ref(), &table, query, 3).await?;

    println!("\nRetrieved context for {query:?}:\n");
    println!("{context}");
    println!("\nSystem prompt preview:\n");
    let prompt = answer_prompt(&context);
    let preview: String = prompt.chars().take(240).collect();
    println!("{preview}…");

    Ok(())
}
