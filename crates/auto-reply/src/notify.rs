use std::sync::Arc;

use {
    tracing::trace,
    wapanel_channels::{MediaRef, PanelEvent, PanelEventSink},
    wapanel_sessions::{ConversationStore, StoredMessage},
};

/// Records outbound messages into history and pushes them to the panel.
///
/// Every message the bot or an operator sends goes through here once the
/// transport accepted it.
pub struct OutboundRecorder {
    store: Arc<ConversationStore>,
    sink: Arc<dyn PanelEventSink>,
}

impl OutboundRecorder {
    pub fn new(store: Arc<ConversationStore>, sink: Arc<dyn PanelEventSink>) -> Self {
        Self { store, sink }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn PanelEventSink> {
        &self.sink
    }

    pub async fn record(
        &self,
        chat_id: &str,
        transport_id: Option<String>,
        body: Option<String>,
        media: Option<MediaRef>,
    ) -> StoredMessage {
        let message = StoredMessage::outbound(transport_id, body, media);
        self.store.push_message(chat_id, message.clone());
        trace!(chat_id, id = %message.id, "outbound message recorded");

        let name = self
            .store
            .chat(chat_id)
            .map_or_else(|| chat_id.to_string(), |c| c.name);
        self.sink
            .emit(PanelEvent::NewMessage {
                chat_id: chat_id.to_string(),
                id: message.id.clone(),
                body: message.body.clone(),
                timestamp_ms: message.timestamp_ms,
                from_me: true,
                media: message.media.clone(),
            })
            .await;
        self.sink
            .emit(PanelEvent::ChatUpdated {
                id: chat_id.to_string(),
                name,
                body: message.preview().to_string(),
                from_me: true,
                timestamp_ms: message.timestamp_ms,
            })
            .await;
        message
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, wapanel_channels::BroadcastEventSink};

    #[tokio::test]
    async fn record_stores_and_broadcasts() {
        let store = Arc::new(ConversationStore::default());
        let sink = Arc::new(BroadcastEventSink::default());
        let mut rx = sink.subscribe();
        let recorder = OutboundRecorder::new(store.clone(), sink);

        let msg = recorder
            .record("1@c.us", Some("wamid-1".into()), Some("hola".into()), None)
            .await;

        assert_eq!(msg.id, "wamid-1");
        assert_eq!(store.history("1@c.us"), vec![msg.clone()]);
        match rx.recv().await.unwrap() {
            PanelEvent::NewMessage {
                chat_id,
                body,
                from_me,
                ..
            } => {
                assert_eq!(chat_id, "1@c.us");
                assert_eq!(body.as_deref(), Some("hola"));
                assert!(from_me);
            },
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            PanelEvent::ChatUpdated { .. }
        ));
    }
}
