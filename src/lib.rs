//! Real-time sync core for the Nexa multi-agent client.
//!
//! Two independent channels feed the client: one shared WebSocket fanned out
//! to many subscribers ([`connection`], [`dispatch`], [`events`]) and chunked
//! HTTP streams assembled into paginated documents ([`stream`], [`document`]).
//! [`canvas`] and [`views`] fold events into view state.

pub mod canvas;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod events;
pub mod snapshot;
pub mod stream;
pub mod views;

pub use canvas::{Canvas, CanvasSummary, ResearchResult, Section, SectionId, apply_updates};
pub use config::{ConnectionProfile, FileConfig, ReconnectSettings, SyncConfig};
pub use connection::{
    ConnectionState, ConnectionStatus, ReconnectPolicy, Subscription, SyncHub, Transport, WsTransport,
};
pub use dispatch::{Dispatcher, SubscriberId};
pub use document::{Footnote, FootnoteStatus, Page, ResearchSession, StreamedDocument};
pub use error::{CanvasError, ConfigError, DecodeError, SnapshotError, StreamError, TransportError};
pub use events::{SyncEvent, decode_frame};
pub use snapshot::{ChatMessage, SnapshotClient};
pub use stream::{CancelFlag, StreamOutcome, StreamRecord};
pub use views::{CanvasStore, EventSink, PipelineView, ProjectView};
