//! End-to-end ingestion: convert, fragment, chunk, embed, store.
//!
//! The pipeline is best-effort per document: conversion and chunking
//! failures (and documents that carry no text) are logged, recorded in
//! the [`IngestionReport`], and never abort the run. Embedding and
//! storage failures are request-level and propagate to the caller.

pub mod convert;
pub mod fetch;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::chunking::Chunker;
use crate::document::extract_fragments;
use crate::indexing::{Indexer, SourcedChunk};
use crate::stores::ChunkTable;
use crate::types::PipelineError;

pub use convert::{BasicConverter, DocumentConverter, HtmlConverter};
pub use fetch::{FetchOutcome, SourceCache, fetch_url};

/// A document to ingest: an uploaded file or a URL.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    File(PathBuf),
    Url(Url),
}

impl DocumentSource {
    /// Source name recorded in chunk provenance: the file's base name,
    /// or the full URL.
    pub fn name(&self) -> String {
        match self {
            DocumentSource::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            DocumentSource::Url(url) => url.to_string(),
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::File(path) => write!(f, "{}", path.display()),
            DocumentSource::Url(url) => write!(f, "{url}"),
        }
    }
}

/// A document dropped from the run, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub source: String,
    pub reason: String,
}

/// Counts surfaced to the user after a run, plus the skip list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionReport {
    pub documents_converted: usize,
    pub chunks_created: usize,
    pub rows_written: usize,
    pub skipped: Vec<SkippedDocument>,
}

/// Drives a document set through the full ingestion flow.
pub struct IngestionPipeline {
    converter: Arc<dyn DocumentConverter>,
    chunker: Chunker,
    indexer: Indexer,
}

impl IngestionPipeline {
    pub fn new(converter: Arc<dyn DocumentConverter>, chunker: Chunker, indexer: Indexer) -> Self {
        Self {
            converter,
            chunker,
            indexer,
        }
    }

    /// Ingests `sources` into `table` in input order. Chunks never span
    /// two documents; all surviving chunks are indexed at the end so
    /// embedding requests batch across documents.
    pub async fn run(
        &self,
        table: &ChunkTable,
        sources: &[DocumentSource],
    ) -> Result<IngestionReport, PipelineError> {
        let mut report = IngestionReport::default();
        let mut staged: Vec<SourcedChunk> = Vec::new();

        for source in sources {
            let name = source.name();
            let doc = match self.converter.convert(source).await {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(source = %name, error = %err, "conversion failed, skipping document");
                    report.skipped.push(SkippedDocument {
                        source: name,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            report.documents_converted += 1;

            let fragments = extract_fragments(&doc);
            if fragments.is_empty() {
                warn!(source = %doc.source, "document produced no text");
                report.skipped.push(SkippedDocument {
                    source: doc.source,
                    reason: "no extractable text".to_string(),
                });
                continue;
            }

            match self.chunker.chunk(&fragments) {
                Ok(chunks) => {
                    report.chunks_created += chunks.len();
                    staged.extend(chunks.into_iter().map(|chunk| SourcedChunk {
                        source: doc.source.clone(),
                        chunk,
                    }));
                }
                Err(err) => {
                    warn!(source = %doc.source, error = %err, "chunking failed, skipping document");
                    report.skipped.push(SkippedDocument {
                        source: doc.source,
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.rows_written = self.indexer.index_chunks(table, &staged).await?;
        info!(
            documents = report.documents_converted,
            chunks = report.chunks_created,
            rows = report.rows_written,
            skipped = report.skipped.len(),
            "ingestion run complete"
        );
        Ok(report)
    }
}
