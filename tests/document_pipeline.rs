//! Integration tests for document assembly invariants.
//! Tests: pagination round trip, preview/final marker agreement, footnote order

use std::io::Cursor;

use nexa_sync::document::pages::split_sections;
use nexa_sync::document::{clean_document, paginate_with_budget, strip_markers};
use nexa_sync::stream::{self, CancelFlag, StreamOutcome, StreamRecord};
use nexa_sync::{ResearchSession, StreamedDocument};

fn sample_document(sections: usize, body_len: usize) -> String {
    let mut text = String::from("Preamble before any heading.\n\n");
    for n in 0..sections {
        let level = "#".repeat(n % 3 + 1);
        text.push_str(&format!("{level} Section {n}\n{}\n\n", "lorem ipsum ".repeat(body_len)));
        text.push_str("#### Not a split point\nstill the same section\n");
    }
    text
}

#[test]
fn pages_concatenate_to_source() {
    for (sections, body_len) in [(0, 0), (1, 5), (6, 40), (12, 300)] {
        let text = sample_document(sections, body_len);
        for budget in [50, 500, 3_000, 100_000] {
            let pages = paginate_with_budget(&text, &[], budget);
            let joined: String = pages.iter().map(|p| p.content.as_str()).collect();
            assert_eq!(joined, text, "sections={sections} budget={budget}");
            let numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
            assert_eq!(numbers, (1..=pages.len()).collect::<Vec<_>>());
        }
    }
}

#[test]
fn multi_section_pages_respect_budget() {
    let text = sample_document(10, 20);
    let pages = paginate_with_budget(&text, &[], 600);
    for page in &pages {
        if split_sections(&page.content).len() > 1 {
            assert!(page.content.chars().count() <= 600);
        }
    }
}

#[test]
fn preview_and_final_agree_when_done_echoes_tokens() {
    let raw = "===FULL_DOCUMENT===\n# Title\nBody one.\n=== EXPANSION ===\nBody two.\n";
    let tokens: Vec<StreamRecord> = raw
        .as_bytes()
        .chunks(7)
        .map(|chunk| StreamRecord::Token {
            content: String::from_utf8(chunk.to_vec()).unwrap(),
        })
        .collect();
    let streamed = StreamedDocument::fold(&tokens);
    let finished = streamed.clone().apply(&StreamRecord::Done {
        research_data: Some(raw.to_string()),
    });
    assert_eq!(streamed.preview(), finished.visible_text());
    assert_eq!(finished.visible_text(), clean_document(&strip_markers(raw)));
}

#[test]
fn stream_without_done_ends_incomplete() {
    let body = "data: {\"type\":\"token\",\"content\":\"partial\"}\n\n";
    let (outcome, document) =
        stream::assemble(Cursor::new(body), &CancelFlag::new(), StreamedDocument::new(), |_| {}).unwrap();
    assert_eq!(outcome, StreamOutcome::Ended);
    assert!(!document.is_complete());
    assert_eq!(document.visible_text(), "partial");
}

#[test]
fn footnote_ids_stay_dense_across_three_passes() {
    let mut session = ResearchSession::new();
    let checks = [
        "✅ The first claim is verified here\n⚠️ The second claim needs review",
        "✅ The third claim from pass two",
        "❓ A fourth claim needing review — forum post\n✅ ok",
    ];
    for (pass, check) in checks.iter().enumerate() {
        let records = [
            StreamRecord::FactCheck {
                content: check.to_string(),
                success: true,
            },
            StreamRecord::Done {
                research_data: Some(format!("# Pass {pass}\ntext")),
            },
        ];
        let document = records
            .iter()
            .fold(session.begin_pass(), |doc, record| doc.apply(record));
        assert!(session.complete_pass(&document));
    }
    let ids: Vec<usize> = session.footnotes().iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(session.footnotes()[3].source.as_deref(), Some("forum post"));
    assert_eq!(session.research_data(), "# Pass 2\ntext");
    let pages = session.pages();
    assert_eq!(pages.last().map(|p| p.footnotes.len()), Some(4));
}
