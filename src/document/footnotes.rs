use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Claims shorter than this are noise ("✅ Yes") and are dropped.
pub const MIN_CLAIM_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootnoteStatus {
    Verified,
    NeedsReview,
}

impl FootnoteStatus {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Verified => "✓",
            Self::NeedsReview => "⚠",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footnote {
    pub id: usize,
    pub claim: String,
    pub status: FootnoteStatus,
    pub source: Option<String>,
}

impl Footnote {
    pub fn render(&self) -> String {
        match &self.source {
            Some(source) => format!("[{}] {} {} — {}", self.id, self.status.symbol(), self.claim, source),
            None => format!("[{}] {} {}", self.id, self.status.symbol(), self.claim),
        }
    }
}

const LIST_PREFIX: &str = r"^[ \t]*(?:[-*•][ \t]+|\d+[.)][ \t]+)?(?:\*\*)?";

static VERIFIED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){LIST_PREFIX}(?:\x{{2705}}|\x{{2714}}\x{{FE0F}}?|\x{{2611}}\x{{FE0F}}?|\[[ \t]*verified[ \t]*\]|verified(?:\*\*)?[ \t]*[:\-\x{{2013}}\x{{2014}}])(?:\*\*)?[ \t]*(?P<rest>.+)$"
    ))
    .expect("verified pattern is valid")
});

static REVIEW_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){LIST_PREFIX}(?:\x{{26A0}}\x{{FE0F}}?|\x{{2753}}|\x{{274C}}|\[[ \t]*needs[ _-]review[ \t]*\]|(?:needs[ _-]review|unverified)(?:\*\*)?[ \t]*[:\-\x{{2013}}\x{{2014}}])(?:\*\*)?[ \t]*(?P<rest>.+)$"
    ))
    .expect("review pattern is valid")
});

/// A dash-like separator with whitespace on both sides.
static SOURCE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ \t]+[-\x{2013}\x{2014}][ \t]+").expect("separator pattern is valid")
});

/// A status word repeated after the symbol, as in `✅ Verified: ...`.
static STATUS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\*\*)?(?:verified|needs[ _-]review|unverified)(?:\*\*)?[ \t]*[:\-\x{2013}\x{2014}](?:\*\*)?[ \t]*",
    )
    .expect("status label pattern is valid")
});

static SOURCE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\*\*)?sources?(?:\*\*)?[ \t]*:[ \t]*").expect("label pattern is valid")
});

fn classify(line: &str) -> Option<(FootnoteStatus, &str)> {
    if let Some(caps) = VERIFIED_LINE.captures(line) {
        return caps.name("rest").map(|m| (FootnoteStatus::Verified, m.as_str()));
    }
    REVIEW_LINE
        .captures(line)
        .and_then(|caps| caps.name("rest"))
        .map(|m| (FootnoteStatus::NeedsReview, m.as_str()))
}

fn split_source(rest: &str) -> (String, Option<String>) {
    let rest = rest.trim();
    let Some(sep) = SOURCE_SEPARATOR.find_iter(rest).last() else {
        return (rest.to_string(), None);
    };
    let claim = rest[..sep.start()].trim().to_string();
    let source = SOURCE_LABEL.replace(rest[sep.end()..].trim(), "").trim().to_string();
    if source.is_empty() {
        (claim, None)
    } else {
        (claim, Some(source))
    }
}

/// Scans fact-check text line by line. Ids are 1-based within the batch;
/// [`append_batch`] renumbers them into a document.
pub fn extract_footnotes(text: &str) -> Vec<Footnote> {
    let mut notes = Vec::new();
    for line in text.lines() {
        let Some((status, rest)) = classify(line) else {
            continue;
        };
        let (claim, source) = split_source(&STATUS_LABEL.replace(rest, ""));
        let claim = claim.trim_end_matches("**").trim().to_string();
        if claim.chars().count() < MIN_CLAIM_CHARS {
            continue;
        }
        notes.push(Footnote {
            id: notes.len() + 1,
            claim,
            status,
            source,
        });
    }
    notes
}

/// Appends `batch` after `notes`, continuing the numbering.
pub fn append_batch(notes: &mut Vec<Footnote>, batch: Vec<Footnote>) -> usize {
    let added = batch.len();
    notes.extend(batch);
    renumber(notes);
    added
}

/// Rewrites ids to `1..=n` in list order.
pub fn renumber(notes: &mut [Footnote]) {
    for (index, note) in notes.iter_mut().enumerate() {
        note.id = index + 1;
    }
}
