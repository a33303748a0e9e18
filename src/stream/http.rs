use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Serialize;

use crate::config::SyncConfig;
use crate::error::StreamError;

pub const RESEARCH_STREAM_PATH: &str = "/api/researcher/chat/stream";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body for one research pass. `research_data` is the current
/// document, empty for a fresh document.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ResearchRequest {
    pub message: String,
    pub research_data: String,
}

impl ResearchRequest {
    pub fn new(message: impl Into<String>, research_data: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            research_data: research_data.into(),
        }
    }
}

/// Client for long-lived streamed responses. `total` bounds the whole
/// exchange including the body; `None` lets a stream run indefinitely.
pub fn stream_client(total: Option<Duration>) -> Result<Client, StreamError> {
    Ok(Client::builder()
        .user_agent(concat!("nexa-sync/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(total)
        .build()?)
}

/// Posts `request` and returns the response once headers arrive. The body
/// is left unread for [`super::read_records`].
pub fn open_research_stream(
    client: &Client,
    config: &SyncConfig,
    request: &ResearchRequest,
) -> Result<Response, StreamError> {
    let url = config.endpoint(RESEARCH_STREAM_PATH);
    tracing::debug!(%url, chars = request.research_data.len(), "opening research stream");
    let response = client
        .post(&url)
        .header("accept", "text/event-stream")
        .json(request)
        .send()?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(StreamError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
