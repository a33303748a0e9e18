//! Event consumers: each folds the socket events it cares about into a view
//! model and ignores the rest.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use serde::Serialize;

use crate::canvas::{Canvas, apply_updates};
use crate::connection::{Subscription, SyncHub};
use crate::events::{AgentMessage, MetricsUpdate, PipelineAgent, RagContent, SyncEvent};

/// Something that can be registered with a hub.
pub trait EventSink: Clone + 'static {
    fn handle(&self, event: &SyncEvent);

    fn attach(&self, hub: &SyncHub) -> Subscription {
        let sink = self.clone();
        hub.subscribe(move |event| sink.handle(event))
    }
}

/// Holds the live canvas. Applies `project_canvas` deltas and the
/// `canvas_updates` carried by `project_complete`.
#[derive(Clone, Default)]
pub struct CanvasStore {
    inner: Rc<RefCell<CanvasStoreState>>,
}

#[derive(Default)]
struct CanvasStoreState {
    canvas: Canvas,
    batches_applied: usize,
}

impl CanvasStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canvas(&self) -> Canvas {
        self.inner.borrow().canvas.clone()
    }

    pub fn batches_applied(&self) -> usize {
        self.inner.borrow().batches_applied
    }

    /// Replaces the canvas wholesale, e.g. from a REST snapshot.
    pub fn reconcile(&self, canvas: Canvas) {
        self.inner.borrow_mut().canvas = canvas;
    }

    pub fn reset(&self) {
        self.reconcile(Canvas::empty());
    }
}

impl EventSink for CanvasStore {
    fn handle(&self, event: &SyncEvent) {
        let updates = match event {
            SyncEvent::ProjectCanvas(data) => &data.canvas_updates,
            SyncEvent::ProjectComplete(data) => &data.canvas_updates,
            _ => return,
        };
        if updates.is_empty() {
            return;
        }
        let mut state = self.inner.borrow_mut();
        let next = apply_updates(&state.canvas, updates, Utc::now());
        state.canvas = next;
        state.batches_applied += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectState {
    pub connected: bool,
    pub thinking: Option<String>,
    /// Token deltas accumulated since the turn began.
    pub streamed: String,
    /// Authoritative response; supersedes `streamed` once set.
    pub response: Option<String>,
    pub agents: Vec<PipelineAgent>,
    pub current_agent: Option<String>,
    pub messages: Vec<AgentMessage>,
    pub web_search_used: bool,
    pub memory_search_used: bool,
    pub reasoning_used: bool,
    pub mentioned_agents: Vec<String>,
    pub error: Option<String>,
    pub complete: bool,
}

impl ProjectState {
    pub fn display_text(&self) -> &str {
        self.response.as_deref().unwrap_or(&self.streamed)
    }

    pub fn is_finished(&self) -> bool {
        self.complete || self.error.is_some()
    }
}

/// Project-manager chat view.
#[derive(Clone, Default)]
pub struct ProjectView {
    inner: Rc<RefCell<ProjectState>>,
}

impl ProjectView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProjectState {
        self.inner.borrow().clone()
    }

    /// Clears per-turn fields before a new message is sent. Connectivity and
    /// the agent message log survive.
    pub fn begin_turn(&self) {
        let mut state = self.inner.borrow_mut();
        let connected = state.connected;
        let messages = std::mem::take(&mut state.messages);
        *state = ProjectState {
            connected,
            messages,
            ..ProjectState::default()
        };
    }
}

impl EventSink for ProjectView {
    fn handle(&self, event: &SyncEvent) {
        let mut state = self.inner.borrow_mut();
        match event {
            SyncEvent::ConnectionStatus(data) => state.connected = data.connected,
            SyncEvent::ProjectThinking(data) => {
                let text = if data.thinking.is_empty() { &data.status } else { &data.thinking };
                state.thinking = Some(text.clone());
            }
            SyncEvent::ProjectToken(data) => state.streamed.push_str(&data.token),
            SyncEvent::ProjectResponse(data) => state.response = Some(data.response.clone()),
            SyncEvent::ProjectTools(data) => {
                state.web_search_used |= data.web_search_used;
                state.memory_search_used |= data.memory_search_used;
            }
            SyncEvent::PipelineProgress(data) => {
                state.agents = data.agents.clone();
                state.current_agent = data.current_agent.clone();
            }
            SyncEvent::AgentMessage(data) => state.messages.push(data.clone()),
            SyncEvent::ProjectComplete(data) => {
                state.response = Some(data.response.clone());
                state.reasoning_used = data.reasoning_used;
                state.mentioned_agents = data.mentioned_agents.clone();
                state.thinking = None;
                state.current_agent = None;
                state.complete = true;
            }
            SyncEvent::ProjectError(data) => {
                tracing::warn!(error = %data.error, "project turn failed");
                state.error = Some(data.error.clone());
                state.thinking = None;
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineState {
    pub agents: Vec<PipelineAgent>,
    pub current_agent: Option<String>,
    pub messages: Vec<AgentMessage>,
    pub rag: Vec<RagContent>,
    pub metrics: Vec<MetricsUpdate>,
}

/// Research pipeline panel: agent states, inter-agent chat, knowledge-base
/// notifications and per-call metrics.
#[derive(Clone, Default)]
pub struct PipelineView {
    inner: Rc<RefCell<PipelineState>>,
}

impl PipelineView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.inner.borrow().clone()
    }

    pub fn clear(&self) {
        *self.inner.borrow_mut() = PipelineState::default();
    }
}

impl EventSink for PipelineView {
    fn handle(&self, event: &SyncEvent) {
        let mut state = self.inner.borrow_mut();
        match event {
            SyncEvent::ResearchPipeline(data) => {
                state.agents = data.agents.clone();
                state.current_agent = data.current_agent.clone();
            }
            SyncEvent::ResearchAgentMessage(data) => state.messages.push(data.clone()),
            SyncEvent::RagContent(data) => state.rag.push(data.clone()),
            SyncEvent::MetricsUpdate(data) => state.metrics.push(data.clone()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::events::{CanvasUpdate, ProjectCanvas, ProjectComplete, ProjectToken, decode_frame};

    fn update(id: &str, content: &str) -> CanvasUpdate {
        CanvasUpdate {
            id: id.into(),
            title: String::new(),
            content: json!(content),
            agent_id: None,
        }
    }

    #[test]
    fn canvas_store_applies_deltas_and_completion() {
        let store = CanvasStore::new();
        store.handle(&SyncEvent::ProjectCanvas(ProjectCanvas {
            canvas_updates: vec![update("identity", "Nexa")],
        }));
        store.handle(&SyncEvent::ProjectComplete(ProjectComplete {
            response: "done".into(),
            canvas_updates: vec![update("execution", "Ship")],
            reasoning_used: false,
            mentioned_agents: vec![],
        }));
        store.handle(&SyncEvent::ProjectToken(ProjectToken { token: "x".into() }));
        let canvas = store.canvas();
        assert_eq!(canvas.identity.content, "Nexa");
        assert_eq!(canvas.execution.content, "Ship");
        assert_eq!(store.batches_applied(), 2);
        store.reset();
        assert_eq!(store.canvas(), Canvas::empty());
    }

    #[test]
    fn response_supersedes_tokens() {
        let view = ProjectView::new();
        for token in ["Hel", "lo"] {
            view.handle(&SyncEvent::ProjectToken(ProjectToken { token: token.into() }));
        }
        assert_eq!(view.state().display_text(), "Hello");
        let complete = decode_frame(
            r#"{"type":"project_complete","data":{"response":"Hello there","mentioned_agents":["identity"]}}"#,
        )
        .unwrap();
        view.handle(&complete);
        let state = view.state();
        assert_eq!(state.display_text(), "Hello there");
        assert!(state.is_finished());
        assert_eq!(state.mentioned_agents, vec!["identity"]);
    }

    #[test]
    fn begin_turn_keeps_connection_and_log() {
        let view = ProjectView::new();
        view.handle(&SyncEvent::connection_status(true));
        view.handle(
            &decode_frame(r#"{"type":"agent_message","data":{"agent_id":"pm","agent_name":"PM","message":"hi"}}"#)
                .unwrap(),
        );
        view.handle(&decode_frame(r#"{"type":"project_error","data":{"error":"boom"}}"#).unwrap());
        assert!(view.state().is_finished());
        view.begin_turn();
        let state = view.state();
        assert!(state.connected);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].message_type, "info");
        assert!(!state.is_finished());
    }

    #[test]
    fn pipeline_view_tracks_research_events_only() {
        let view = PipelineView::new();
        view.handle(
            &decode_frame(
                r#"{"type":"research_pipeline","data":{"agents":[{"id":"planner","name":"Planner","status":"active"}],"current_agent":"planner"}}"#,
            )
            .unwrap(),
        );
        view.handle(
            &decode_frame(r#"{"type":"pipeline_progress","data":{"agents":[],"current_agent":"other"}}"#).unwrap(),
        );
        view.handle(
            &decode_frame(r#"{"type":"rag_content","data":{"action":"indexed","content":"3 chunks"}}"#).unwrap(),
        );
        let state = view.state();
        assert_eq!(state.current_agent.as_deref(), Some("planner"));
        assert_eq!(state.agents.len(), 1);
        assert_eq!(state.rag.len(), 1);
    }
}
