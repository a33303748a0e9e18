//! REST snapshot calls used to reconcile state on demand. Events are never
//! replayed, so late joiners fetch the current canvas here instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::canvas::{Canvas, decode_snapshot};
use crate::config::SyncConfig;
use crate::error::{DecodeError, SnapshotError};
use crate::events::CanvasUpdate;

pub const CANVAS_PATH: &str = "/api/canvas/";
pub const RESEARCH_DATA_PATH: &str = "/api/researcher/data";
pub const PROJECT_STREAM_PATH: &str = "/api/project/chat/stream";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResearchDataResponse {
    #[serde(default)]
    data: Option<String>,
}

pub struct SnapshotClient {
    agent: ureq::Agent,
    config: SyncConfig,
}

impl SnapshotClient {
    pub fn new(config: &SyncConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("nexa-sync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            config: config.clone(),
        }
    }

    fn get_json(&self, path: &str) -> Result<Value, SnapshotError> {
        let url = self.config.endpoint(path);
        tracing::debug!(%url, "snapshot GET");
        Ok(self.agent.get(&url).call()?.into_json::<Value>()?)
    }

    pub fn fetch_canvas(&self) -> Result<Canvas, SnapshotError> {
        let body = self.get_json(CANVAS_PATH)?;
        decode_snapshot(&body).map_err(|err| match err {
            DecodeError::Json(source) | DecodeError::Payload { source, .. } => {
                SnapshotError::Payload(source)
            }
            DecodeError::MissingType => SnapshotError::Payload(serde::de::Error::custom(
                "canvas snapshot is not an object",
            )),
        })
    }

    /// The researcher's current document; empty when none exists yet.
    pub fn fetch_research_data(&self) -> Result<String, SnapshotError> {
        let body = self.get_json(RESEARCH_DATA_PATH)?;
        let response: ResearchDataResponse = serde_json::from_value(body)?;
        Ok(response.data.unwrap_or_default())
    }

    /// Starts a project turn. The reply itself arrives as socket events
    /// (`project_thinking` through `project_complete`).
    pub fn post_project_message(
        &self,
        messages: &[ChatMessage],
        current_canvas: &[CanvasUpdate],
    ) -> Result<Value, SnapshotError> {
        let url = self.config.endpoint(PROJECT_STREAM_PATH);
        tracing::debug!(%url, messages = messages.len(), "posting project message");
        let payload = json!({
            "messages": messages,
            "current_canvas": current_canvas,
        });
        Ok(self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(payload)?
            .into_json::<Value>()?)
    }
}
