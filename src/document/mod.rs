//! Incremental assembly of a streamed research document.
//!
//! A [`StreamedDocument`] is a fold over stream records. Until `done` the
//! visible text is the marker-stripped token accumulation; after `done` it
//! is the server's cleaned document. Pages are derived once, on completion.

pub mod footnotes;
pub mod markers;
pub mod pages;

use serde::Serialize;

use crate::stream::StreamRecord;

pub use footnotes::{Footnote, FootnoteStatus};
pub use markers::{clean_document, strip_markers};
pub use pages::{PAGE_CHAR_BUDGET, Page, paginate, paginate_with_budget};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamedDocument {
    raw: String,
    footnotes: Vec<Footnote>,
    fact_check_failures: usize,
    final_text: Option<String>,
    pages: Vec<Page>,
}

impl StreamedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a pass that keeps numbering after `footnotes` from earlier passes.
    pub fn with_footnotes(footnotes: Vec<Footnote>) -> Self {
        Self {
            footnotes,
            ..Self::default()
        }
    }

    pub fn fold<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a StreamRecord>,
    {
        records
            .into_iter()
            .fold(Self::new(), |doc, record| doc.apply(record))
    }

    /// One fold step.
    pub fn apply(mut self, record: &StreamRecord) -> Self {
        match record {
            StreamRecord::Token { content } => self.raw.push_str(content),
            StreamRecord::FactCheck { content, success } => {
                if *success {
                    let batch = footnotes::extract_footnotes(content);
                    let added = footnotes::append_batch(&mut self.footnotes, batch);
                    tracing::debug!(added, total = self.footnotes.len(), "fact-check applied");
                    if self.is_complete() {
                        self.repaginate();
                    }
                } else {
                    self.fact_check_failures += 1;
                    tracing::warn!("fact-check pass reported failure; no footnotes added");
                }
            }
            StreamRecord::Done { research_data } => {
                let text = match research_data.as_deref().map(str::trim) {
                    Some(data) if !data.is_empty() => clean_document(data),
                    _ => clean_document(&self.raw),
                };
                self.final_text = Some(text);
                self.repaginate();
            }
            StreamRecord::Other => {}
        }
        self
    }

    fn repaginate(&mut self) {
        let text = self.visible_text();
        self.pages = paginate(&text, &self.footnotes);
    }

    /// Accumulated token text exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn preview(&self) -> String {
        clean_document(&self.raw)
    }

    pub fn is_complete(&self) -> bool {
        self.final_text.is_some()
    }

    pub fn final_text(&self) -> Option<&str> {
        self.final_text.as_deref()
    }

    /// Final text once complete, preview before that.
    pub fn visible_text(&self) -> String {
        match &self.final_text {
            Some(text) => text.clone(),
            None => self.preview(),
        }
    }

    pub fn footnotes(&self) -> &[Footnote] {
        &self.footnotes
    }

    pub fn fact_check_failures(&self) -> usize {
        self.fact_check_failures
    }

    /// Empty until the document is complete.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }
}

/// Carries a document across successive research passes. Each pass sends
/// the current text as `research_data` and replaces it with the pass result.
#[derive(Debug, Clone, Default)]
pub struct ResearchSession {
    text: String,
    footnotes: Vec<Footnote>,
    passes: usize,
}

impl ResearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes from an existing document.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn research_data(&self) -> &str {
        &self.text
    }

    pub fn footnotes(&self) -> &[Footnote] {
        &self.footnotes
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn begin_pass(&self) -> StreamedDocument {
        StreamedDocument::with_footnotes(self.footnotes.clone())
    }

    /// Adopts a finished pass. Incomplete (cancelled or truncated) passes
    /// leave the session unchanged and return `false`.
    pub fn complete_pass(&mut self, document: &StreamedDocument) -> bool {
        let Some(text) = document.final_text() else {
            return false;
        };
        self.text = text.to_string();
        self.footnotes = document.footnotes().to_vec();
        self.passes += 1;
        true
    }

    pub fn pages(&self) -> Vec<Page> {
        paginate(&self.text, &self.footnotes)
    }
}
