use std::sync::Arc;

use {
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
    wapanel_auto_reply::{AutoReplyOutcome, Decision},
    wapanel_channels::{ChatInfo, InboundMessage, PanelEvent},
    wapanel_common::{ids::local_message_id, time::transport_ts_to_ms},
    wapanel_sessions::StoredMessage,
};

#[cfg(feature = "metrics")]
use wapanel_metrics::{counter, inbound as inbound_metrics};

use crate::service::PanelService;

/// Conversations registered from the transport's list at startup.
pub const READY_CHAT_LIMIT: usize = 200;

/// What the pipeline did with one inbound message.
#[derive(Debug)]
pub struct InboundReceipt {
    pub chat_id: String,
    /// First time this conversation was seen.
    pub created: bool,
    /// The conversation was hidden and is visible again.
    pub unhidden: bool,
    pub decision: Decision,
    /// The detached auto-reply task, when one was started.
    pub reply: Option<JoinHandle<AutoReplyOutcome>>,
}

impl PanelService {
    /// Run the inbound pipeline: revive, register, record, notify, then the
    /// auto-reply gate. The reply itself runs on its own task so action
    /// delays never hold up other conversations.
    pub async fn on_inbound(&self, msg: &dyn InboundMessage) -> InboundReceipt {
        let chat_id = msg.chat_id().to_string();

        #[cfg(feature = "metrics")]
        counter!(inbound_metrics::MESSAGES_RECEIVED_TOTAL).increment(1);

        let unhidden = match self.flags.hidden.remove(&chat_id) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(chat_id, error = %e, "un-hide kept in memory only");
                true
            },
        };
        if unhidden {
            info!(chat_id, "hidden conversation revived by new message");
            #[cfg(feature = "metrics")]
            counter!(inbound_metrics::CHATS_UNHIDDEN_TOTAL).increment(1);
        }

        let name = msg.chat_name().unwrap_or(chat_id.as_str()).to_string();
        let created = self.store.ensure_chat(ChatInfo {
            id: chat_id.clone(),
            name: name.clone(),
            is_group: msg.is_group(),
        });

        let stored = StoredMessage {
            id: msg
                .id()
                .map_or_else(|| local_message_id("in"), str::to_string),
            body: msg.body().map(str::to_string),
            media: msg.media().cloned(),
            timestamp_ms: transport_ts_to_ms(msg.timestamp()),
            from_me: msg.is_from_self(),
        };
        self.store.push_message(&chat_id, stored.clone());
        debug!(chat_id, id = %stored.id, from_me = stored.from_me, "inbound message stored");

        self.sink
            .emit(PanelEvent::NewMessage {
                chat_id: chat_id.clone(),
                id: stored.id.clone(),
                body: stored.body.clone(),
                timestamp_ms: stored.timestamp_ms,
                from_me: stored.from_me,
                media: stored.media.clone(),
            })
            .await;
        self.sink
            .emit(PanelEvent::ChatUpdated {
                id: chat_id.clone(),
                name,
                body: inbound_preview(&stored),
                from_me: stored.from_me,
                timestamp_ms: stored.timestamp_ms,
            })
            .await;
        if created || unhidden {
            if let Some(chat) = self.store.chat(&chat_id) {
                self.sink.emit(PanelEvent::ChatCreated { chat }).await;
            }
            self.sink
                .emit(PanelEvent::Chats {
                    chats: self.visible_chats(),
                })
                .await;
        }

        let sender_known = self.sender_known(msg).await;
        let decision = self.engine.decide(msg, sender_known);
        let reply = match &decision {
            Decision::Fire(plan) => {
                let engine = Arc::clone(&self.engine);
                let plan = plan.clone();
                Some(tokio::spawn(async move { engine.execute(plan).await }))
            },
            Decision::Skip(_) => None,
        };

        InboundReceipt {
            chat_id,
            created,
            unhidden,
            decision,
            reply,
        }
    }

    /// The transport finished connecting: register its conversations, minus
    /// hidden ones, and publish the list.
    pub async fn on_ready(&self, chats: Vec<ChatInfo>) {
        let mut registered = 0usize;
        for chat in chats
            .into_iter()
            .filter(|c| !self.flags.hidden.contains(&c.id))
            .take(READY_CHAT_LIMIT)
        {
            self.store.ensure_chat(chat);
            registered += 1;
        }
        info!(registered, "transport ready");
        self.sink.emit(PanelEvent::Ready).await;
        self.sink
            .emit(PanelEvent::Chats {
                chats: self.visible_chats(),
            })
            .await;
    }

    /// Address-book classification, asking the transport when the message
    /// did not carry it. An unanswerable query counts as known so the bot
    /// stays quiet.
    async fn sender_known(&self, msg: &dyn InboundMessage) -> bool {
        if let Some(known) = msg.sender_known() {
            return known;
        }
        if msg.is_from_self() || !self.engine.state().is_enabled() {
            return true;
        }
        match self.transport.is_known_contact(msg.sender_id()).await {
            Ok(known) => known,
            Err(e) => {
                warn!(sender = msg.sender_id(), error = %e, "contact lookup failed");
                true
            },
        }
    }
}

fn inbound_preview(message: &StoredMessage) -> String {
    match (message.body.as_deref(), &message.media) {
        (Some(body), _) if !body.is_empty() => body.to_string(),
        (_, Some(_)) => message.preview().to_string(),
        _ => String::new(),
    }
}
