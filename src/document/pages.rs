use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::footnotes::Footnote;

/// Soft per-page size in characters. A single section larger than this
/// still gets a page of its own.
pub const PAGE_CHAR_BUDGET: usize = 3_000;

/// Level 1-3 markdown heading at the start of a line.
static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,3}[ \t]").expect("heading pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub content: String,
    pub page_number: usize,
    pub footnotes: Vec<Footnote>,
}

impl Page {
    /// Page body, its footnotes, then a `— Page n of total —` footer.
    pub fn render(&self, total_pages: usize) -> String {
        let mut out = self.content.trim_end().to_string();
        if !self.footnotes.is_empty() {
            out.push_str("\n\n---\n");
            for note in &self.footnotes {
                out.push('\n');
                out.push_str(&note.render());
            }
        }
        out.push_str(&format!("\n\n— Page {} of {} —", self.page_number, total_pages));
        out
    }
}

/// Splits before every heading. Concatenating the slices gives back `text`.
pub fn split_sections(text: &str) -> Vec<&str> {
    let mut cuts: Vec<usize> = SECTION_HEADING
        .find_iter(text)
        .map(|m| m.start())
        .filter(|&start| start > 0)
        .collect();
    cuts.push(text.len());

    let mut sections = Vec::with_capacity(cuts.len());
    let mut start = 0;
    for end in cuts {
        if end > start {
            sections.push(&text[start..end]);
        }
        start = end;
    }
    sections
}

pub fn paginate(text: &str, footnotes: &[Footnote]) -> Vec<Page> {
    paginate_with_budget(text, footnotes, PAGE_CHAR_BUDGET)
}

/// Greedily packs whole sections into pages of at most `budget` characters.
/// Each footnote lands on the first page mentioning its claim, or on the
/// last page when no page does.
pub fn paginate_with_budget(text: &str, footnotes: &[Footnote], budget: usize) -> Vec<Page> {
    let mut bodies: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for section in split_sections(text) {
        let chars = section.chars().count();
        if current_chars > 0 && current_chars + chars > budget {
            bodies.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push_str(section);
        current_chars += chars;
    }
    if !current.is_empty() {
        bodies.push(current);
    }

    let mut pages: Vec<Page> = bodies
        .into_iter()
        .enumerate()
        .map(|(index, content)| Page {
            content,
            page_number: index + 1,
            footnotes: Vec::new(),
        })
        .collect();
    if pages.is_empty() {
        return pages;
    }

    let lowered: Vec<String> = pages.iter().map(|p| p.content.to_lowercase()).collect();
    let last = pages.len() - 1;
    for note in footnotes {
        let claim = note.claim.to_lowercase();
        let index = lowered
            .iter()
            .position(|content| content.contains(&claim))
            .unwrap_or(last);
        pages[index].footnotes.push(note.clone());
    }
    pages
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::document::footnotes::FootnoteStatus;

    fn note(id: usize, claim: &str) -> Footnote {
        Footnote {
            id,
            claim: claim.into(),
            status: FootnoteStatus::Verified,
            source: None,
        }
    }

    fn joined(pages: &[Page]) -> String {
        pages.iter().map(|p| p.content.as_str()).collect()
    }

    #[test]
    fn split_keeps_every_byte() {
        let text = "intro\n# One\nbody\n#### deep\n## Two\nmore\n### Three";
        let sections = split_sections(text);
        assert_eq!(sections, vec!["intro\n", "# One\nbody\n#### deep\n", "## Two\nmore\n", "### Three"]);
        assert_eq!(sections.concat(), text);
    }

    #[test]
    fn no_headings_is_one_page() {
        let pages = paginate("just a paragraph", &[]);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
    }

    #[test]
    fn empty_text_has_no_pages() {
        assert!(paginate("", &[note(1, "anything at all")]).is_empty());
    }

    #[test]
    fn sections_pack_until_budget() {
        let section = |n: usize| format!("# S{n}\n{}\n", "x".repeat(40));
        let text: String = (1..=5).map(section).collect();
        let pages = paginate_with_budget(&text, &[], 100);
        assert_eq!(pages.len(), 3);
        assert_eq!(joined(&pages), text);
        assert!(pages[0].content.starts_with("# S1") && pages[0].content.contains("# S2"));
        assert!(pages[2].content.starts_with("# S5"));
    }

    #[test]
    fn oversized_section_stands_alone() {
        let big = format!("# Big\n{}\n", "y".repeat(500));
        let text = format!("# Small\nz\n{big}# Tail\nt\n");
        let pages = paginate_with_budget(&text, &[], 100);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].content, big);
        assert_eq!(joined(&pages), text);
    }

    #[test]
    fn footnotes_follow_their_claims() {
        let text = format!("# A\n{}\n# B\nThe Moon orbits Earth.\n", "a".repeat(60));
        let notes = [note(1, "the moon orbits earth"), note(2, "claim found nowhere")];
        let pages = paginate_with_budget(&text, &notes, 70);
        assert_eq!(pages.len(), 2);
        assert!(pages[0].footnotes.is_empty());
        assert_eq!(pages[1].footnotes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn render_appends_footnotes_and_footer() {
        let page = Page {
            content: "# Title\nbody\n".into(),
            page_number: 2,
            footnotes: vec![note(3, "body claim text")],
        };
        assert_eq!(
            page.render(5),
            "# Title\nbody\n\n---\n\n[3] ✓ body claim text\n\n— Page 2 of 5 —"
        );
    }
}
