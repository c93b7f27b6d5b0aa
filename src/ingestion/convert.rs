//! Document converters.
//!
//! Conversion proper is a collaborator concern: anything able to turn a
//! file or URL into a [`ParsedDocument`] can feed the pipeline. The
//! built-in [`BasicConverter`] covers HTML and plain text; richer
//! formats (PDF, DOCX) plug in behind the same trait.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::fs;

use super::fetch::{SourceCache, fetch_url};
use super::DocumentSource;
use crate::document::{DocumentShape, Element, ParsedDocument};
use crate::types::PipelineError;

/// Turns a source reference into a normalized document.
///
/// Failures are per-item: the pipeline logs them, records the source in
/// the run report, and moves on to the next document.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, source: &DocumentSource) -> Result<ParsedDocument, PipelineError>;
}

/// Extracts an ordered heading/body element stream from HTML.
pub struct HtmlConverter;

const BODY_TAGS: [&str; 6] = ["p", "li", "pre", "blockquote", "td", "th"];

impl HtmlConverter {
    pub fn parse(source: &str, html: &str) -> Result<ParsedDocument, PipelineError> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("h1, h2, h3, h4, h5, h6, p, li, pre, blockquote, td, th")
            .map_err(|err| PipelineError::Conversion(err.to_string()))?;

        let mut elements = Vec::new();
        for node in document.select(&selector) {
            // Skip nested matches so e.g. a <p> inside an <li> is not
            // extracted twice.
            if has_body_ancestor(&node) {
                continue;
            }

            let text = normalize_whitespace(&node.text().collect::<String>());
            if text.is_empty() {
                continue;
            }

            let name = node.value().name();
            match heading_level(name) {
                Some(level) => elements.push(Element::heading(level, text)),
                None => elements.push(Element::text(text)),
            }
        }

        Ok(ParsedDocument::new(source, DocumentShape::Flat(elements)))
    }
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn has_body_ancestor(node: &ElementRef) -> bool {
    node.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| BODY_TAGS.contains(&ancestor.value().name()))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Default converter: reads files from disk, fetches URLs (optionally
/// through a [`SourceCache`]), and parses HTML or passes text through.
pub struct BasicConverter {
    client: reqwest::Client,
    cache: Option<SourceCache>,
}

impl BasicConverter {
    pub fn new() -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder().use_rustls_tls().build()?;
        Ok(Self {
            client,
            cache: None,
        })
    }

    #[must_use]
    pub fn with_cache(mut self, cache: SourceCache) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[async_trait]
impl DocumentConverter for BasicConverter {
    async fn convert(&self, source: &DocumentSource) -> Result<ParsedDocument, PipelineError> {
        match source {
            DocumentSource::File(path) => {
                let content = fs::read_to_string(path).await?;
                let name = source.name();
                let is_html = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
                    || content.trim_start().starts_with('<');
                if is_html {
                    HtmlConverter::parse(&name, &content)
                } else {
                    Ok(ParsedDocument::new(name, DocumentShape::Plain(content)))
                }
            }
            DocumentSource::Url(url) => {
                let outcome = fetch_url(&self.client, url, self.cache.as_ref()).await?;
                if outcome.content.trim_start().starts_with('<') {
                    HtmlConverter::parse(url.as_str(), &outcome.content)
                } else {
                    Ok(ParsedDocument::new(
                        url.as_str(),
                        DocumentShape::Plain(outcome.content),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{extract_fragments, ElementKind};

    #[test]
    fn html_parses_headings_and_body_in_order() {
        let html = r#"
            <html><body>
                <h1>Title</h1>
                <p>Intro paragraph.</p>
                <h2>Section 1</h2>
                <p>Body A.</p>
                <ul><li>Item one</li><li>Item two</li></ul>
            </body></html>
        "#;

        let doc = HtmlConverter::parse("page.html", html).unwrap();
        let DocumentShape::Flat(elements) = &doc.shape else {
            panic!("expected flat shape");
        };

        let kinds: Vec<_> = elements.iter().map(|e| (e.kind, e.text.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ElementKind::Heading { level: 1 }, "Title"),
                (ElementKind::Text, "Intro paragraph."),
                (ElementKind::Heading { level: 2 }, "Section 1"),
                (ElementKind::Text, "Body A."),
                (ElementKind::Text, "Item one"),
                (ElementKind::Text, "Item two"),
            ]
        );
    }

    #[test]
    fn nested_blocks_are_not_extracted_twice() {
        let html = "<ul><li>Outer <p>inner paragraph</p></li></ul>";
        let doc = HtmlConverter::parse("page.html", html).unwrap();
        let DocumentShape::Flat(elements) = &doc.shape else {
            panic!("expected flat shape");
        };
        assert_eq!(elements.len(), 1);
        assert!(elements[0].text.contains("inner paragraph"));
    }

    #[test]
    fn whitespace_collapses_inside_elements() {
        let html = "<p>spread   across\n   lines</p>";
        let doc = HtmlConverter::parse("page.html", html).unwrap();
        let fragments = extract_fragments(&doc);
        assert_eq!(fragments[0].text, "spread across lines");
    }

    #[tokio::test]
    async fn file_conversion_routes_on_extension_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let txt_path = dir.path().join("note.txt");
        tokio::fs::write(&txt_path, "plain body").await.unwrap();
        let html_path = dir.path().join("page.html");
        tokio::fs::write(&html_path, "<p>html body</p>").await.unwrap();

        let converter = BasicConverter::new().unwrap();

        let doc = converter
            .convert(&DocumentSource::File(txt_path))
            .await
            .unwrap();
        assert!(matches!(doc.shape, DocumentShape::Plain(_)));
        assert_eq!(doc.source, "note.txt");

        let doc = converter
            .convert(&DocumentSource::File(html_path))
            .await
            .unwrap();
        assert!(matches!(doc.shape, DocumentShape::Flat(_)));
    }

    #[tokio::test]
    async fn missing_file_is_a_conversion_failure() {
        let converter = BasicConverter::new().unwrap();
        let result = converter
            .convert(&DocumentSource::File("/nonexistent/void.txt".into()))
            .await;
        assert!(result.is_err());
    }
}
