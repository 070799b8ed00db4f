//! In-memory [`Transport`] for tests across the workspace.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    Error, Result,
    transport::{ChatInfo, ConnectionState, MediaOptions, MediaPayload, SentMessage, Transport},
};

/// A successful transport call as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Text {
        chat_id: String,
        text: String,
    },
    Media {
        chat_id: String,
        filename: String,
        mime_type: String,
        caption: Option<String>,
        as_voice: bool,
    },
    TypingOn(String),
    TypingOff(String),
}

/// Records every call and fails sends on demand.
pub struct MockTransport {
    state: Mutex<ConnectionState>,
    known_contacts: Mutex<HashSet<String>>,
    chats: Mutex<HashMap<String, ChatInfo>>,
    chats_resolvable: AtomicBool,
    disconnect_on_failure: AtomicBool,
    calls: Mutex<Vec<TransportCall>>,
    scripted_failures: Mutex<VecDeque<String>>,
    permanent_failure: Mutex<Option<String>>,
    send_delay: Duration,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockTransport {
    pub fn connected() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Connected),
            known_contacts: Mutex::new(HashSet::new()),
            chats: Mutex::new(HashMap::new()),
            chats_resolvable: AtomicBool::new(true),
            disconnect_on_failure: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            scripted_failures: Mutex::new(VecDeque::new()),
            permanent_failure: Mutex::new(None),
            send_delay: Duration::ZERO,
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    pub fn add_known_contact(&self, contact_id: &str) {
        lock(&self.known_contacts).insert(contact_id.to_string());
    }

    pub fn add_chat(&self, chat: ChatInfo) {
        lock(&self.chats).insert(chat.id.clone(), chat);
    }

    /// When false, `resolve_chat` never finds a conversation.
    pub fn set_chats_resolvable(&self, resolvable: bool) {
        self.chats_resolvable.store(resolvable, Ordering::SeqCst);
    }

    /// When true, a failed send also drops the state to `Disconnected`.
    pub fn set_disconnect_on_failure(&self, disconnect: bool) {
        self.disconnect_on_failure.store(disconnect, Ordering::SeqCst);
    }

    /// Fail the next send attempt with `message`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, message: &str) {
        lock(&self.scripted_failures).push_back(message.to_string());
    }

    /// Fail every send attempt with `message`.
    pub fn fail_always(&self, message: &str) {
        *lock(&self.permanent_failure) = Some(message.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.scripted_failures).clear();
        *lock(&self.permanent_failure) = None;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    pub fn sent_texts(&self) -> Vec<(String, String)> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                TransportCall::Text { chat_id, text } => Some((chat_id.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    /// Send attempts, including failed ones.
    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run_send(&self, call: TransportCall) -> Result<SentMessage> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }

        let failure = lock(&self.scripted_failures)
            .pop_front()
            .or_else(|| lock(&self.permanent_failure).clone());

        let result = match failure {
            Some(message) => {
                if self.disconnect_on_failure.load(Ordering::SeqCst) {
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(Error::transport(message))
            },
            None => {
                let mut calls = lock(&self.calls);
                calls.push(call);
                Ok(SentMessage {
                    id: Some(format!("mock-{}", calls.len())),
                })
            },
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn record_presence(&self, call: TransportCall) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        lock(&self.calls).push(call);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn state(&self) -> Result<ConnectionState> {
        Ok(lock(&self.state).clone())
    }

    async fn resolve_chat(&self, chat_id: &str) -> Result<Option<ChatInfo>> {
        if !self.chats_resolvable.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(
            lock(&self.chats)
                .get(chat_id)
                .cloned()
                .unwrap_or_else(|| ChatInfo::lite(chat_id)),
        ))
    }

    async fn is_known_contact(&self, contact_id: &str) -> Result<bool> {
        Ok(lock(&self.known_contacts).contains(contact_id))
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<SentMessage> {
        self.run_send(TransportCall::Text {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        })
        .await
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media: &MediaPayload,
        options: &MediaOptions,
    ) -> Result<SentMessage> {
        self.run_send(TransportCall::Media {
            chat_id: chat_id.to_string(),
            filename: media.filename.clone(),
            mime_type: media.mime_type.clone(),
            caption: options.caption.clone(),
            as_voice: options.as_voice,
        })
        .await
    }

    async fn set_typing(&self, chat_id: &str) -> Result<()> {
        self.record_presence(TransportCall::TypingOn(chat_id.to_string()));
        Ok(())
    }

    async fn clear_typing(&self, chat_id: &str) -> Result<()> {
        self.record_presence(TransportCall::TypingOff(chat_id.to_string()));
        Ok(())
    }
}
