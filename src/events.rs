//! Outbound event sink
//!
//! Backends push notifications through an injected `EventSink`; the host
//! decides how they travel (stdio, IPC, in-process channel).

use serde_json::Value;
use tokio::sync::broadcast;

use crate::models::{LanguageId, WorkspaceFolder};

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// Handshake finished; the backend accepts requests
    Ready {
        language: LanguageId,
        workspace: WorkspaceFolder,
    },
    /// Every parsed backend message, verbatim
    Data {
        message: Value,
        language: LanguageId,
        workspace: WorkspaceFolder,
    },
    /// Backend-initiated message in JSON-RPC notification shape
    Notification {
        message: Value,
        language: LanguageId,
        workspace: WorkspaceFolder,
    },
    /// Per-method channel (`notification:<method>`) carrying the params
    Method {
        method: String,
        params: Value,
        language: LanguageId,
        workspace: WorkspaceFolder,
    },
}

impl BridgeEvent {
    pub fn channel(&self) -> String {
        match self {
            Self::Ready { .. } => "ready".to_string(),
            Self::Data { .. } => "data".to_string(),
            Self::Notification { .. } => "notification".to_string(),
            Self::Method { method, .. } => format!("notification:{}", method),
        }
    }

    pub fn language(&self) -> &LanguageId {
        match self {
            Self::Ready { language, .. }
            | Self::Data { language, .. }
            | Self::Notification { language, .. }
            | Self::Method { language, .. } => language,
        }
    }

    pub fn workspace(&self) -> &WorkspaceFolder {
        match self {
            Self::Ready { workspace, .. }
            | Self::Data { workspace, .. }
            | Self::Notification { workspace, .. }
            | Self::Method { workspace, .. } => workspace,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::Ready { .. } => Value::Null,
            Self::Data { message, .. } | Self::Notification { message, .. } => message.clone(),
            Self::Method { params, .. } => params.clone(),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: BridgeEvent);
}

/// Fans every event out to all current subscribers
pub struct BroadcastSink {
    tx: broadcast::Sender<BridgeEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: BridgeEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

/// Discards events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, event: BridgeEvent) {
        tracing::trace!("Dropped {} event", event.channel());
    }
}
