//! Typed vocabulary of socket events.
//!
//! Frames arrive as `{"type": "...", "data": {...}}`. Decoding goes through
//! [`decode_frame`], which maps the string discriminator onto [`SyncEvent`].
//! Types outside the vocabulary become [`SyncEvent::Unknown`] so consumers can
//! ignore them; a known type whose payload does not match its shape is a
//! [`DecodeError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatusData {
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySource {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub collection: String,
}

/// One reasoning step of a chain-of-thought run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_number: u32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub llm_response: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub sources: Option<Vec<WebSource>>,
    #[serde(default)]
    pub memory_sources: Option<Vec<MemorySource>>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub passed: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainProgress {
    pub request: String,
    pub status: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub final_answer: Option<String>,
    #[serde(default)]
    pub verification: Option<Verification>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainComplete {
    #[serde(default)]
    pub final_answer: Option<String>,
    #[serde(default)]
    pub verification: Option<Verification>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStream {
    pub request_id: String,
    pub step_number: u32,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamComplete {
    pub request_id: String,
    pub step_number: u32,
    pub full_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectThinking {
    pub status: String,
    #[serde(default)]
    pub thinking: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectToken {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub response: String,
}

/// A canvas delta as it travels on the wire.
///
/// `content` is plain text for the four project sections and a research
/// object for `researcher`; the reducer discriminates on `id`, so it is kept
/// untyped here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasUpdate {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCanvas {
    #[serde(default)]
    pub canvas_updates: Vec<CanvasUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectComplete {
    pub response: String,
    #[serde(default)]
    pub canvas_updates: Vec<CanvasUpdate>,
    #[serde(default)]
    pub reasoning_used: bool,
    #[serde(default)]
    pub mentioned_agents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTools {
    #[serde(default)]
    pub web_search_used: bool,
    #[serde(default)]
    pub memory_search_used: bool,
    #[serde(default)]
    pub rag_results: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectError {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Active,
    Complete,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineAgent {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub result_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    #[serde(default)]
    pub agents: Vec<PipelineAgent>,
    #[serde(default)]
    pub current_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub agent_id: String,
    pub agent_name: String,
    pub message: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

fn default_message_type() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub agent_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub latency_ms: f64,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub tokens_per_second: f64,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagContent {
    pub action: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Every event a subscriber can observe.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Synthetic; emitted by the hub on every open and close, never read from the wire.
    ConnectionStatus(ConnectionStatusData),
    ChainProgress(ChainProgress),
    StepUpdate(Step),
    ChainComplete(ChainComplete),
    ChainError(String),
    TokenStream(TokenStream),
    StreamComplete(StreamComplete),
    ProjectThinking(ProjectThinking),
    ProjectToken(ProjectToken),
    ProjectResponse(ProjectResponse),
    ProjectCanvas(ProjectCanvas),
    ProjectComplete(ProjectComplete),
    ProjectTools(ProjectTools),
    ProjectError(ProjectError),
    PipelineProgress(PipelineProgress),
    AgentMessage(AgentMessage),
    MetricsUpdate(MetricsUpdate),
    ResearchPipeline(PipelineProgress),
    ResearchAgentMessage(AgentMessage),
    RagContent(RagContent),
    Unknown { kind: String },
}

impl SyncEvent {
    pub fn connection_status(connected: bool) -> Self {
        Self::ConnectionStatus(ConnectionStatusData { connected })
    }

    /// Wire discriminator for this event.
    pub fn kind(&self) -> &str {
        match self {
            Self::ConnectionStatus(_) => "connection_status",
            Self::ChainProgress(_) => "chain_progress",
            Self::StepUpdate(_) => "step_update",
            Self::ChainComplete(_) => "chain_complete",
            Self::ChainError(_) => "chain_error",
            Self::TokenStream(_) => "token_stream",
            Self::StreamComplete(_) => "stream_complete",
            Self::ProjectThinking(_) => "project_thinking",
            Self::ProjectToken(_) => "project_token",
            Self::ProjectResponse(_) => "project_response",
            Self::ProjectCanvas(_) => "project_canvas",
            Self::ProjectComplete(_) => "project_complete",
            Self::ProjectTools(_) => "project_tools",
            Self::ProjectError(_) => "project_error",
            Self::PipelineProgress(_) => "pipeline_progress",
            Self::AgentMessage(_) => "agent_message",
            Self::MetricsUpdate(_) => "metrics_update",
            Self::ResearchPipeline(_) => "research_pipeline",
            Self::ResearchAgentMessage(_) => "research_agent_message",
            Self::RagContent(_) => "rag_content",
            Self::Unknown { kind } => kind.as_str(),
        }
    }

    /// Re-encode as a `{type, data}` frame (used by `watch --json`).
    pub fn to_frame(&self) -> serde_json::Value {
        let data = match self {
            Self::ConnectionStatus(d) => serde_json::to_value(d),
            Self::ChainProgress(d) => serde_json::to_value(d),
            Self::StepUpdate(d) => serde_json::to_value(d),
            Self::ChainComplete(d) => serde_json::to_value(d),
            Self::ChainError(d) => serde_json::to_value(d),
            Self::TokenStream(d) => serde_json::to_value(d),
            Self::StreamComplete(d) => serde_json::to_value(d),
            Self::ProjectThinking(d) => serde_json::to_value(d),
            Self::ProjectToken(d) => serde_json::to_value(d),
            Self::ProjectResponse(d) => serde_json::to_value(d),
            Self::ProjectCanvas(d) => serde_json::to_value(d),
            Self::ProjectComplete(d) => serde_json::to_value(d),
            Self::ProjectTools(d) => serde_json::to_value(d),
            Self::ProjectError(d) => serde_json::to_value(d),
            Self::PipelineProgress(d) | Self::ResearchPipeline(d) => serde_json::to_value(d),
            Self::AgentMessage(d) | Self::ResearchAgentMessage(d) => serde_json::to_value(d),
            Self::MetricsUpdate(d) => serde_json::to_value(d),
            Self::RagContent(d) => serde_json::to_value(d),
            Self::Unknown { .. } => Ok(serde_json::Value::Null),
        }
        .unwrap_or(serde_json::Value::Null);
        serde_json::json!({ "type": self.kind(), "data": data })
    }
}

fn payload<T: DeserializeOwned>(kind: &str, data: serde_json::Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        kind: kind.to_string(),
        source,
    })
}

/// Decode one text frame.
pub fn decode_frame(text: &str) -> Result<SyncEvent, DecodeError> {
    let mut value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or(DecodeError::MissingType)?;
    let data = value
        .get_mut("data")
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null);

    let event = match kind.as_str() {
        "connection_status" => SyncEvent::ConnectionStatus(payload(&kind, data)?),
        "chain_progress" => SyncEvent::ChainProgress(payload(&kind, data)?),
        "step_update" => SyncEvent::StepUpdate(payload(&kind, data)?),
        "chain_complete" => SyncEvent::ChainComplete(payload(&kind, data)?),
        "chain_error" => SyncEvent::ChainError(match data {
            serde_json::Value::String(message) => message,
            other => other.to_string(),
        }),
        "token_stream" => SyncEvent::TokenStream(payload(&kind, data)?),
        "stream_complete" => SyncEvent::StreamComplete(payload(&kind, data)?),
        "project_thinking" => SyncEvent::ProjectThinking(payload(&kind, data)?),
        "project_token" => SyncEvent::ProjectToken(payload(&kind, data)?),
        "project_response" => SyncEvent::ProjectResponse(payload(&kind, data)?),
        "project_canvas" => SyncEvent::ProjectCanvas(payload(&kind, data)?),
        "project_complete" => SyncEvent::ProjectComplete(payload(&kind, data)?),
        "project_tools" => SyncEvent::ProjectTools(payload(&kind, data)?),
        "project_error" => SyncEvent::ProjectError(payload(&kind, data)?),
        "pipeline_progress" => SyncEvent::PipelineProgress(payload(&kind, data)?),
        "agent_message" => SyncEvent::AgentMessage(payload(&kind, data)?),
        "metrics_update" => SyncEvent::MetricsUpdate(payload(&kind, data)?),
        "research_pipeline" => SyncEvent::ResearchPipeline(payload(&kind, data)?),
        "research_agent_message" => SyncEvent::ResearchAgentMessage(payload(&kind, data)?),
        "rag_content" => SyncEvent::RagContent(payload(&kind, data)?),
        _ => SyncEvent::Unknown { kind },
    };
    Ok(event)
}
