//! Integration tests for the HTTP side against a loopback tiny_http server.
//! Tests: chunked research stream, non-2xx status, snapshot endpoints

use std::io::Read;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tiny_http::{Header, Method, Response, Server, StatusCode};

use nexa_sync::config::{ConnectionProfile, SyncConfig};
use nexa_sync::error::{SnapshotError, StreamError};
use nexa_sync::stream::http::{ResearchRequest, open_research_stream, stream_client};
use nexa_sync::stream::{self, CancelFlag, StreamOutcome};
use nexa_sync::{Canvas, ChatMessage, SnapshotClient, StreamedDocument};

/// Body reader that yields fixed pieces with a pause between them, so the
/// server emits several chunks and records straddle chunk boundaries.
struct Pieces {
    pieces: Vec<Vec<u8>>,
    next: usize,
}

impl Read for Pieces {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let Some(piece) = self.pieces.get(self.next) else {
            return Ok(0);
        };
        thread::sleep(Duration::from_millis(5));
        let n = piece.len().min(buf.len());
        buf[..n].copy_from_slice(&piece[..n]);
        if n == piece.len() {
            self.next += 1;
        } else {
            self.pieces[self.next].drain(..n);
        }
        Ok(n)
    }
}

struct Captured {
    method: Method,
    url: String,
    body: String,
}

type Reply = (u16, &'static str, Box<dyn Read + Send>);

fn reply(status: u16, content_type: &'static str, body: impl Read + Send + 'static) -> Reply {
    (status, content_type, Box::new(body))
}

/// Serves one reply per entry in `replies`, reporting each request.
fn serve(replies: Vec<Reply>) -> (SyncConfig, mpsc::Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for (status, content_type, body) in replies {
            let mut request = server.recv().unwrap();
            let mut text = String::new();
            request.as_reader().read_to_string(&mut text).unwrap();
            let _ = tx.send(Captured {
                method: request.method().clone(),
                url: request.url().to_string(),
                body: text,
            });
            let header = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()).unwrap();
            let response = Response::new(StatusCode(status), vec![header], body, None, None);
            let _ = request.respond(response);
        }
    });
    let mut config = SyncConfig::for_profile(ConnectionProfile::Browser);
    config.set_backend_url(&format!("http://{addr}")).unwrap();
    (config, rx)
}

fn research_body() -> Box<dyn Read + Send> {
    let records = concat!(
        "data: {\"type\":\"token\",\"content\":\"===FULL_DOCUMENT===\\n# Intro\\n\"}\n\n",
        ": keep-alive\n\n",
        "data: {\"type\":\"token\",\"content\":\"Rust 1.0 shipped in 2015.\"}\n\n",
        "data: {\"type\":\"fact_check\",\"content\":\"✅ Rust 1.0 shipped in 2015 — blog.rust-lang.org\",\"success\":true}\n\n",
        "data: {\"type\":\"done\",\"research_data\":\"# Intro\\nRust 1.0 shipped in 2015.\"}\n\n",
    )
    .as_bytes();
    let pieces = records.chunks(17).map(<[u8]>::to_vec).collect();
    Box::new(Pieces { pieces, next: 0 })
}

#[test]
fn research_stream_assembles_document() {
    let (config, requests) = serve(vec![(200, "text/event-stream", research_body())]);
    let client = stream_client(Some(Duration::from_secs(10))).unwrap();
    let request = ResearchRequest::new("tell me about rust", "");
    let response = open_research_stream(&client, &config, &request).unwrap();

    let mut previews = Vec::new();
    let (outcome, document) = stream::assemble(response, &CancelFlag::new(), StreamedDocument::new(), |doc| {
        previews.push(doc.preview())
    })
    .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed);
    assert!(previews.iter().all(|p| !p.contains("===")));
    assert_eq!(document.final_text(), Some("# Intro\nRust 1.0 shipped in 2015."));
    assert_eq!(document.footnotes().len(), 1);
    assert_eq!(document.footnotes()[0].source.as_deref(), Some("blog.rust-lang.org"));
    let pages = document.pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].footnotes.len(), 1);

    let captured = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(captured.method, Method::Post);
    assert_eq!(captured.url, "/api/researcher/chat/stream");
    let body: Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(body, json!({"message": "tell me about rust", "research_data": ""}));
}

#[test]
fn research_stream_error_status() {
    let (config, _requests) = serve(vec![reply(500, "text/plain", &b"model offline"[..])]);
    let client = stream_client(None).unwrap();
    let err = open_research_stream(&client, &config, &ResearchRequest::new("q", "")).unwrap_err();
    match err {
        StreamError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model offline");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cancelled_stream_leaves_document_incomplete() {
    let (config, _requests) = serve(vec![(200, "text/event-stream", research_body())]);
    let client = stream_client(None).unwrap();
    let response = open_research_stream(&client, &config, &ResearchRequest::new("q", "")).unwrap();

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let (outcome, document) = stream::assemble(response, &cancel, StreamedDocument::new(), |_| trigger.cancel())
        .unwrap();
    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert!(!document.is_complete());
    assert!(document.pages().is_empty());
}

#[test]
fn snapshot_endpoints() {
    let canvas_body = json!({
        "canvas": {
            "identity": {"id": "identity", "title": "Identity", "content": "Nexa", "agent_id": "identity", "last_updated": null},
            "execution": {"id": "execution", "title": "Execution", "content": "", "agent_id": "execution", "last_updated": null}
        },
        "summary": {"sections": {"identity": {"version": 2}}}
    })
    .to_string();
    let (config, requests) = serve(vec![
        reply(200, "application/json", std::io::Cursor::new(canvas_body)),
        reply(200, "application/json", &br#"{"success":true,"data":"existing doc"}"#[..]),
        reply(200, "application/json", &br#"{"status":"completed"}"#[..]),
        reply(404, "application/json", &br#"{"detail":"Not Found"}"#[..]),
    ]);
    let client = SnapshotClient::new(&config);

    let canvas = client.fetch_canvas().unwrap();
    assert_eq!(canvas.identity.content, "Nexa");
    assert_eq!(canvas.identity.version, 2);
    assert_eq!(canvas.definition, Canvas::empty().definition);

    assert_eq!(client.fetch_research_data().unwrap(), "existing doc");

    let ack = client
        .post_project_message(&[ChatMessage::user("build a bot")], &canvas.to_updates())
        .unwrap();
    assert_eq!(ack["status"], "completed");

    assert!(matches!(client.fetch_canvas(), Err(SnapshotError::Request(_))));

    let urls: Vec<String> = requests.try_iter().map(|c| c.url).collect();
    assert_eq!(
        urls,
        vec!["/api/canvas/", "/api/researcher/data", "/api/project/chat/stream", "/api/canvas/"]
    );
}

#[test]
fn project_message_payload_shape() {
    let (config, requests) = serve(vec![reply(200, "application/json", &b"{}"[..])]);
    let mut canvas = Canvas::empty();
    canvas.identity.content = "Nexa".into();
    SnapshotClient::new(&config)
        .post_project_message(
            &[ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            &canvas.to_updates(),
        )
        .unwrap();

    let captured = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    let body: Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(body["messages"][1], json!({"role": "assistant", "content": "hello"}));
    assert_eq!(body["current_canvas"].as_array().unwrap().len(), 4);
    assert_eq!(body["current_canvas"][0]["content"], "Nexa");
}
