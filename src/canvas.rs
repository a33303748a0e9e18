//! Project canvas: a fixed set of named sections updated by partial deltas.
//!
//! [`apply_updates`] is the pure reducer. It never adds or removes sections,
//! leaves unnamed sections untouched and discriminates the `researcher`
//! section by id, not by sniffing its content. Updates are last-applied-wins
//! with no ordering or duplicate detection.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CanvasError, DecodeError};
use crate::events::{CanvasUpdate, WebSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    Identity,
    Definition,
    Resources,
    Execution,
    Researcher,
}

impl SectionId {
    /// The plain-text sections, in display order.
    pub const TEXT: [SectionId; 4] = [
        SectionId::Identity,
        SectionId::Definition,
        SectionId::Resources,
        SectionId::Execution,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "identity" => Some(Self::Identity),
            "definition" => Some(Self::Definition),
            "resources" => Some(Self::Resources),
            "execution" => Some(Self::Execution),
            "researcher" => Some(Self::Researcher),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Definition => "definition",
            Self::Resources => "resources",
            Self::Execution => "execution",
            Self::Researcher => "researcher",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            Self::Identity => "Identity",
            Self::Definition => "Definition",
            Self::Resources => "Resources",
            Self::Execution => "Execution",
            Self::Researcher => "Research",
        }
    }
}

/// Structured payload of the `researcher` section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResearchResult {
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub sources: Vec<WebSource>,
    #[serde(default)]
    pub indexed_to_rag: bool,
    #[serde(default)]
    pub rag_collection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section<C> {
    pub id: SectionId,
    pub title: String,
    pub content: C,
    /// Owning agent; defaults to the section id.
    pub agent_id: String,
    /// Bumped only when `content` actually changes.
    pub version: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<C: Default + PartialEq> Section<C> {
    pub fn empty(id: SectionId) -> Self {
        Self {
            id,
            title: id.default_title().to_string(),
            content: C::default(),
            agent_id: id.as_str().to_string(),
            version: 0,
            last_updated: None,
        }
    }

    fn set(&mut self, title: &str, content: C, agent_id: Option<&str>, now: DateTime<Utc>) {
        if content != self.content {
            self.version += 1;
            self.content = content;
        }
        if !title.trim().is_empty() {
            self.title = title.to_string();
        }
        if let Some(agent) = agent_id.filter(|a| !a.is_empty()) {
            self.agent_id = agent.to_string();
        }
        self.last_updated = Some(now);
    }
}

impl Section<String> {
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

impl Section<Option<ResearchResult>> {
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub identity: Section<String>,
    pub definition: Section<String>,
    pub resources: Section<String>,
    pub execution: Section<String>,
    pub researcher: Section<Option<ResearchResult>>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionSummary {
    pub has_content: bool,
    pub version: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanvasSummary {
    pub sections: BTreeMap<SectionId, SectionSummary>,
    pub completion: Completion,
}

impl Canvas {
    pub fn empty() -> Self {
        Self {
            identity: Section::empty(SectionId::Identity),
            definition: Section::empty(SectionId::Definition),
            resources: Section::empty(SectionId::Resources),
            execution: Section::empty(SectionId::Execution),
            researcher: Section::empty(SectionId::Researcher),
        }
    }

    /// `None` for `researcher`, which is not a text section.
    pub fn text_section(&self, id: SectionId) -> Option<&Section<String>> {
        match id {
            SectionId::Identity => Some(&self.identity),
            SectionId::Definition => Some(&self.definition),
            SectionId::Resources => Some(&self.resources),
            SectionId::Execution => Some(&self.execution),
            SectionId::Researcher => None,
        }
    }

    fn text_section_mut(&mut self, id: SectionId) -> Option<&mut Section<String>> {
        match id {
            SectionId::Identity => Some(&mut self.identity),
            SectionId::Definition => Some(&mut self.definition),
            SectionId::Resources => Some(&mut self.resources),
            SectionId::Execution => Some(&mut self.execution),
            SectionId::Researcher => None,
        }
    }

    /// Applies one update in place and returns the section it touched.
    pub fn apply(&mut self, update: &CanvasUpdate, now: DateTime<Utc>) -> Result<SectionId, CanvasError> {
        let id = SectionId::parse(&update.id)
            .ok_or_else(|| CanvasError::UnknownSection(update.id.clone()))?;
        let agent = update.agent_id.as_deref();

        if id == SectionId::Researcher {
            let content = match &update.content {
                Value::Null => None,
                Value::Object(_) => Some(
                    serde_json::from_value::<ResearchResult>(update.content.clone()).map_err(|_| {
                        CanvasError::ContentShape {
                            section: id.as_str(),
                            expected: "a research result object",
                        }
                    })?,
                ),
                _ => {
                    return Err(CanvasError::ContentShape {
                        section: id.as_str(),
                        expected: "a research result object",
                    });
                }
            };
            self.researcher.set(&update.title, content, agent, now);
            return Ok(id);
        }

        let content = match &update.content {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            _ => {
                return Err(CanvasError::ContentShape {
                    section: id.as_str(),
                    expected: "text",
                });
            }
        };
        if let Some(section) = self.text_section_mut(id) {
            section.set(&update.title, content, agent, now);
        }
        Ok(id)
    }

    /// Empties one section's content, keeping its title and owner.
    pub fn clear_section(&mut self, id: SectionId, now: DateTime<Utc>) {
        if id == SectionId::Researcher {
            let title = self.researcher.title.clone();
            self.researcher.set(&title, None, None, now);
        } else if let Some(section) = self.text_section_mut(id) {
            let title = section.title.clone();
            section.set(&title, String::new(), None, now);
        }
    }

    pub fn completion(&self) -> Completion {
        let total = SectionId::TEXT.len();
        let completed = SectionId::TEXT
            .iter()
            .filter_map(|&id| self.text_section(id))
            .filter(|section| section.has_content())
            .count();
        Completion {
            completed,
            total,
            percentage: (completed * 100 / total) as u8,
        }
    }

    pub fn summary(&self) -> CanvasSummary {
        let mut sections = BTreeMap::new();
        for id in SectionId::TEXT {
            if let Some(section) = self.text_section(id) {
                sections.insert(
                    id,
                    SectionSummary {
                        has_content: section.has_content(),
                        version: section.version,
                        last_updated: section.last_updated,
                    },
                );
            }
        }
        sections.insert(
            SectionId::Researcher,
            SectionSummary {
                has_content: self.researcher.has_content(),
                version: self.researcher.version,
                last_updated: self.researcher.last_updated,
            },
        );
        CanvasSummary {
            sections,
            completion: self.completion(),
        }
    }

    /// Plain-text rendering of the four text sections for an LLM prompt.
    pub fn export_for_prompt(&self) -> String {
        let mut out = String::from("Current Canvas State:");
        for id in SectionId::TEXT {
            let Some(section) = self.text_section(id) else {
                continue;
            };
            let content = section.content.trim();
            let content = if content.is_empty() { "(empty)" } else { content };
            out.push_str(&format!("\n\n## {}\n{}", section.title, content));
        }
        out
    }

    /// The text sections as wire updates, for sending the current canvas
    /// along with a project message.
    pub fn to_updates(&self) -> Vec<CanvasUpdate> {
        SectionId::TEXT
            .iter()
            .filter_map(|&id| self.text_section(id))
            .map(|section| CanvasUpdate {
                id: section.id.as_str().to_string(),
                title: section.title.clone(),
                content: Value::String(section.content.clone()),
                agent_id: Some(section.agent_id.clone()),
            })
            .collect()
    }
}

/// Pure reducer: returns a new canvas with `updates` applied in order.
/// Updates that cannot be applied are logged and skipped.
pub fn apply_updates(canvas: &Canvas, updates: &[CanvasUpdate], now: DateTime<Utc>) -> Canvas {
    let mut next = canvas.clone();
    for update in updates {
        match next.apply(update, now) {
            Ok(id) => tracing::debug!(section = id.as_str(), "canvas section updated"),
            Err(err) => tracing::warn!(%err, "skipping canvas update"),
        }
    }
    next
}

#[derive(Debug, Deserialize)]
struct SnapshotSection {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotSummarySection {
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Deserialize, Default)]
struct SnapshotSummary {
    #[serde(default)]
    sections: BTreeMap<String, SnapshotSummarySection>,
}

/// Accepts RFC 3339 or a naive ISO timestamp, read as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Decodes a `GET /api/canvas/` body (`{"canvas": {...}, "summary": {...}}`,
/// or a bare section map). Unknown section keys are ignored.
pub fn decode_snapshot(body: &Value) -> Result<Canvas, DecodeError> {
    let sections = body.get("canvas").unwrap_or(body);
    let sections: BTreeMap<String, SnapshotSection> = serde_json::from_value(sections.clone())
        .map_err(|source| DecodeError::Payload {
            kind: "canvas_snapshot".to_string(),
            source,
        })?;
    let summary: SnapshotSummary = body
        .get("summary")
        .and_then(|s| serde_json::from_value(s.clone()).ok())
        .unwrap_or_default();

    let mut canvas = Canvas::empty();
    for (key, section) in sections {
        let Some(id) = SectionId::parse(&key) else {
            tracing::debug!(section = %key, "ignoring unknown snapshot section");
            continue;
        };
        let last_updated = section.last_updated.as_deref().and_then(parse_timestamp);
        let version = summary.sections.get(&key).map(|s| s.version).unwrap_or(0);
        let title = section
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| id.default_title().to_string());
        let agent_id = section.agent_id.unwrap_or_else(|| id.as_str().to_string());

        if id == SectionId::Researcher {
            canvas.researcher = Section {
                id,
                title,
                content: serde_json::from_value(section.content).ok(),
                agent_id,
                version,
                last_updated,
            };
        } else if let Some(slot) = canvas.text_section_mut(id) {
            *slot = Section {
                id,
                title,
                content: section.content.as_str().unwrap_or_default().to_string(),
                agent_id,
                version,
                last_updated,
            };
        }
    }
    Ok(canvas)
}
