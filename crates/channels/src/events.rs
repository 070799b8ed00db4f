use {
    async_trait::async_trait,
    serde::Serialize,
    tokio::sync::broadcast,
    tracing::trace,
};

use crate::{inbound::MediaRef, transport::ChatInfo};

// ── Panel events (pub/sub) ──────────────────────────────────────────────────

/// Events pushed to the operator panel for live views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelEvent {
    /// A message was added to a conversation's history.
    NewMessage {
        chat_id: String,
        id: String,
        body: Option<String>,
        timestamp_ms: i64,
        from_me: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        media: Option<MediaRef>,
    },
    /// Conversation preview line changed.
    ChatUpdated {
        id: String,
        name: String,
        body: String,
        from_me: bool,
        timestamp_ms: i64,
    },
    /// A conversation was seen for the first time.
    ChatCreated { chat: ChatInfo },
    /// Full visible conversation list.
    Chats { chats: Vec<ChatInfo> },
    /// The transport finished connecting.
    Ready,
}

/// Sink for panel events. The panel server provides the concrete
/// implementation.
#[async_trait]
pub trait PanelEventSink: Send + Sync {
    async fn emit(&self, event: PanelEvent);
}

/// In-process sink fanning events out over a tokio broadcast channel.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<PanelEvent>,
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl PanelEventSink for BroadcastEventSink {
    async fn emit(&self, event: PanelEvent) {
        // No subscribers is fine; the panel may not be open.
        if self.tx.send(event).is_err() {
            trace!("panel event dropped, no subscribers");
        }
    }
}
