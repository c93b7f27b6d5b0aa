//! Normalized document model and fragment extraction.
//!
//! External converters produce heterogeneous structures: paginated
//! documents, flat element streams, or a single text blob. The
//! [`DocumentShape`] enum makes those three shapes explicit so the
//! adapter can match exhaustively instead of probing for attributes,
//! and [`extract_fragments`] flattens any shape into an ordered list of
//! [`Fragment`]s carrying page and heading provenance.

use serde::{Deserialize, Serialize};

/// A parsed document as handed over by a converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Source name: the originating filename or URL, verbatim.
    pub source: String,
    pub shape: DocumentShape,
}

impl ParsedDocument {
    pub fn new(source: impl Into<String>, shape: DocumentShape) -> Self {
        Self {
            source: source.into(),
            shape,
        }
    }
}

/// The three structural shapes a converted document can take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentShape {
    /// Ordered pages, each with optional direct text and/or elements.
    Paged(Vec<Page>),
    /// No page structure, just an ordered element stream.
    Flat(Vec<Element>),
    /// A single undifferentiated text blob.
    Plain(String),
}

/// One page of a paginated document. Page numbers are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    /// Pre-assembled page text. Takes precedence over `elements`.
    pub text: Option<String>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Page {
    pub fn with_text(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: Some(text.into()),
            elements: Vec::new(),
        }
    }

    pub fn with_elements(number: u32, elements: Vec<Element>) -> Self {
        Self {
            number,
            text: None,
            elements,
        }
    }
}

/// A structural element inside a page or a flat document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    pub text: String,
}

impl Element {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Heading { level },
            text: text.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Text,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    /// Section heading; `level` follows HTML semantics (1 = outermost).
    Heading { level: u8 },
    /// Body text: paragraphs, list items, code, captions.
    Text,
}

/// A contiguous unit of extracted text, pre-chunking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    /// Page the text came from, when the document is paginated.
    pub page: Option<u32>,
    /// Heading trail from root to nearest enclosing section, as it stood
    /// at the fragment's first body text.
    pub headings: Vec<String>,
}

/// Running heading trail keyed by level so a new `h2` closes any open
/// `h2`..`h6` sections before starting its own.
#[derive(Debug, Default)]
struct HeadingTrail {
    entries: Vec<(u8, String)>,
}

impl HeadingTrail {
    fn push(&mut self, level: u8, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.entries.retain(|(lvl, _)| *lvl < level);
        self.entries.push((level, text.to_string()));
    }

    fn snapshot(&self) -> Vec<String> {
        self.entries.iter().map(|(_, text)| text.clone()).collect()
    }
}

/// Flattens a document into ordered fragments. Pure; documents that
/// carry no text yield an empty list rather than an error.
pub fn extract_fragments(doc: &ParsedDocument) -> Vec<Fragment> {
    match &doc.shape {
        DocumentShape::Paged(pages) => extract_from_pages(pages),
        DocumentShape::Flat(elements) => extract_from_elements(elements),
        DocumentShape::Plain(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![Fragment {
                    text: text.clone(),
                    page: None,
                    headings: Vec::new(),
                }]
            }
        }
    }
}

fn extract_from_pages(pages: &[Page]) -> Vec<Fragment> {
    let mut trail = HeadingTrail::default();
    let mut fragments = Vec::new();

    for page in pages {
        let direct = page
            .text
            .as_deref()
            .filter(|text| !text.trim().is_empty());
        if let Some(text) = direct {
            fragments.push(Fragment {
                text: text.to_string(),
                page: Some(page.number),
                headings: trail.snapshot(),
            });
            continue;
        }

        if let Some(fragment) = collect_body(&page.elements, &mut trail, Some(page.number)) {
            fragments.push(fragment);
        }
    }

    fragments
}

fn extract_from_elements(elements: &[Element]) -> Vec<Fragment> {
    let mut trail = HeadingTrail::default();
    collect_body(elements, &mut trail, None)
        .into_iter()
        .collect()
}

/// Concatenates non-empty body texts with newline separators into one
/// fragment. Headings update the trail but do not join the body; the
/// fragment carries the trail in effect at its first body element.
fn collect_body(
    elements: &[Element],
    trail: &mut HeadingTrail,
    page: Option<u32>,
) -> Option<Fragment> {
    let mut body = String::new();
    let mut headings: Option<Vec<String>> = None;

    for element in elements {
        match element.kind {
            ElementKind::Heading { level } => trail.push(level, &element.text),
            ElementKind::Text => {
                if element.text.trim().is_empty() {
                    continue;
                }
                if headings.is_none() {
                    headings = Some(trail.snapshot());
                }
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(&element.text);
            }
        }
    }

    if body.is_empty() {
        None
    } else {
        Some(Fragment {
            text: body,
            page,
            headings: headings.unwrap_or_default(),
        })
    }
}
