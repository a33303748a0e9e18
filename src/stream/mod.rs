//! Newline-delimited `data: {json}` records from a chunked HTTP body.

pub mod http;

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::document::StreamedDocument;
use crate::error::{DecodeError, StreamError};

const READ_CHUNK_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    Token {
        content: String,
    },
    FactCheck {
        content: String,
        #[serde(default = "default_success")]
        success: bool,
    },
    /// Carries the server-cleaned full document; supersedes accumulated tokens.
    Done {
        #[serde(default)]
        research_data: Option<String>,
    },
    #[serde(other)]
    Other,
}

fn default_success() -> bool {
    true
}

/// How a stream read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    /// A `done` record arrived.
    Completed,
    /// The caller cancelled; not an error.
    Cancelled,
    /// The body ended without a `done` record.
    Ended,
}

/// Cooperative cancellation shared between the reader and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Splits a byte stream into complete lines, holding back an unterminated tail.
///
/// Lines are decoded only once complete, so a multi-byte character split
/// across two reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// The unterminated tail, if any; called once the body is exhausted.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// `None` for lines that carry no record (blank, comments, other SSE fields).
pub fn parse_line(line: &str) -> Option<Result<StreamRecord, DecodeError>> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    Some(serde_json::from_str(payload).map_err(DecodeError::from))
}

/// Reads `body` to the end (or until cancelled or a `done` record), calling
/// `on_record` for each decoded record. Malformed records are logged and
/// skipped.
pub fn read_records<R, F>(
    mut body: R,
    cancel: &CancelFlag,
    mut on_record: F,
) -> Result<StreamOutcome, StreamError>
where
    R: Read,
    F: FnMut(StreamRecord),
{
    let mut framer = LineFramer::new();
    let mut buf = vec![0_u8; READ_CHUNK_BYTES];

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(discarded = framer.buffered(), "stream cancelled");
            return Ok(StreamOutcome::Cancelled);
        }
        let n = match body.read(&mut buf) {
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                if cancel.is_cancelled() {
                    return Ok(StreamOutcome::Cancelled);
                }
                return Err(err.into());
            }
        };
        let (lines, at_end) = if n == 0 {
            (framer.finish().into_iter().collect(), true)
        } else {
            (framer.push(&buf[..n]), false)
        };

        for line in lines {
            if cancel.is_cancelled() {
                return Ok(StreamOutcome::Cancelled);
            }
            match parse_line(&line) {
                Some(Ok(StreamRecord::Other)) => {
                    tracing::debug!("ignoring stream record of unknown type");
                }
                Some(Ok(record)) => {
                    let done = matches!(record, StreamRecord::Done { .. });
                    on_record(record);
                    if done {
                        return Ok(StreamOutcome::Completed);
                    }
                }
                Some(Err(err)) => tracing::warn!(%err, "skipping malformed stream record"),
                None => {}
            }
        }

        if at_end {
            return Ok(StreamOutcome::Ended);
        }
    }
}

/// Folds a stream into `document`, reporting every intermediate snapshot.
pub fn assemble<R, F>(
    body: R,
    cancel: &CancelFlag,
    document: StreamedDocument,
    mut on_update: F,
) -> Result<(StreamOutcome, StreamedDocument), StreamError>
where
    R: Read,
    F: FnMut(&StreamedDocument),
{
    let mut document = document;
    let outcome = read_records(body, cancel, |record| {
        document = std::mem::take(&mut document).apply(&record);
        on_update(&document);
    })?;
    Ok((outcome, document))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Hands out the body in fixed-size pieces to force split records.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = (self.pos + self.step).min(self.data.len()).min(self.pos + buf.len());
            let n = end - self.pos;
            buf[..n].copy_from_slice(&self.data[self.pos..end]);
            self.pos = end;
            Ok(n)
        }
    }

    fn body() -> String {
        [
            r#"data: {"type":"token","content":"Héllo "}"#,
            "",
            r#"data: {"type":"token","content":"Wörld"}"#,
            "",
            r#"data: {"type":"done","research_data":"Héllo Wörld"}"#,
            "",
        ]
        .join("\n")
    }

    #[test]
    fn framer_holds_back_partial_lines() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"data: {\"ty").is_empty());
        assert_eq!(framer.push(b"pe\":1}\r\nnext"), vec!["data: {\"type\":1}"]);
        assert_eq!(framer.finish().as_deref(), Some("next"));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn framer_reassembles_split_utf8() {
        let bytes = "é\n".as_bytes();
        let mut framer = LineFramer::new();
        assert!(framer.push(&bytes[..1]).is_empty());
        assert_eq!(framer.push(&bytes[1..]), vec!["é"]);
    }

    #[test]
    fn parse_line_variants() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(parse_line("event: message"), None);
        assert_eq!(
            parse_line(r#"data:{"type":"token","content":"x"}"#).unwrap().unwrap(),
            StreamRecord::Token { content: "x".into() }
        );
        assert!(parse_line("data: {oops").unwrap().is_err());
        assert_eq!(
            parse_line(r#"data: {"type":"heartbeat"}"#).unwrap().unwrap(),
            StreamRecord::Other
        );
        assert_eq!(
            parse_line(r#"data: {"type":"fact_check","content":"c"}"#).unwrap().unwrap(),
            StreamRecord::FactCheck { content: "c".into(), success: true }
        );
    }

    #[test]
    fn records_survive_one_byte_reads() {
        let reader = Trickle {
            data: body().into_bytes(),
            pos: 0,
            step: 1,
        };
        let mut records = Vec::new();
        let outcome = read_records(reader, &CancelFlag::new(), |r| records.push(r)).unwrap();
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], StreamRecord::Token { content: "Wörld".into() });
    }

    #[test]
    fn malformed_record_does_not_abort() {
        let data = "data: {broken\n\ndata: {\"type\":\"token\",\"content\":\"ok\"}\n";
        let mut records = Vec::new();
        let outcome =
            read_records(Cursor::new(data), &CancelFlag::new(), |r| records.push(r)).unwrap();
        assert_eq!(outcome, StreamOutcome::Ended);
        assert_eq!(records, vec![StreamRecord::Token { content: "ok".into() }]);
    }

    #[test]
    fn unterminated_final_record_is_flushed() {
        let data = "data: {\"type\":\"done\",\"research_data\":\"x\"}";
        let mut records = Vec::new();
        let outcome =
            read_records(Cursor::new(data), &CancelFlag::new(), |r| records.push(r)).unwrap();
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn cancellation_stops_without_completion() {
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let mut seen = 0;
        let reader = Trickle {
            data: body().into_bytes(),
            pos: 0,
            step: 4,
        };
        let outcome = read_records(reader, &cancel, |_| {
            seen += 1;
            trigger.cancel();
        })
        .unwrap();
        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(seen, 1);
    }

    #[test]
    fn assemble_scenario_hello_world() {
        let mut previews = Vec::new();
        let (outcome, document) = assemble(
            Cursor::new(body().replace('é', "e").replace('ö', "o")),
            &CancelFlag::new(),
            StreamedDocument::new(),
            |doc| previews.push((doc.preview(), doc.is_complete())),
        )
        .unwrap();
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(previews[1], ("Hello World".to_string(), false));
        assert_eq!(document.final_text(), Some("Hello World"));
        assert_eq!(document.visible_text(), "Hello World");
    }
}
