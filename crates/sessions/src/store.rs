use std::{
    collections::{HashMap, VecDeque},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use {
    serde::{Deserialize, Serialize},
    tracing::trace,
    wapanel_channels::{ChatInfo, MediaRef},
    wapanel_common::{ids::local_message_id, time::now_ms},
};

use crate::flags::FlagSet;

/// Default per-conversation history capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// One entry of a conversation's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    pub timestamp_ms: i64,
    pub from_me: bool,
}

impl StoredMessage {
    /// A message sent by the panel or the bot, stamped with the local clock.
    /// Uses the transport id when one was reported.
    pub fn outbound(id: Option<String>, body: Option<String>, media: Option<MediaRef>) -> Self {
        Self {
            id: id.unwrap_or_else(|| local_message_id("local")),
            body,
            media,
            timestamp_ms: now_ms(),
            from_me: true,
        }
    }

    /// Preview line for the conversation list.
    pub fn preview(&self) -> &str {
        match self.body.as_deref() {
            Some(body) if !body.is_empty() => body,
            _ => "[Attachment]",
        }
    }
}

struct Conversation {
    info: ChatInfo,
    history: VecDeque<StoredMessage>,
}

impl Conversation {
    fn new(info: ChatInfo) -> Self {
        Self {
            info,
            history: VecDeque::new(),
        }
    }

    fn last_activity(&self) -> Option<i64> {
        self.history.back().map(|m| m.timestamp_ms)
    }
}

/// In-memory registry of conversations with a bounded history each.
///
/// Histories are FIFO ring buffers: once `capacity` is reached the oldest
/// entry is dropped for every new one.
pub struct ConversationStore {
    capacity: usize,
    chats: RwLock<HashMap<String, Conversation>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ConversationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chats: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Conversation>> {
        self.chats.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Conversation>> {
        self.chats.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a conversation or refresh its display name. Returns `true`
    /// when the conversation was not known before.
    ///
    /// The group flag is fixed by the first observation.
    pub fn ensure_chat(&self, info: ChatInfo) -> bool {
        let mut chats = self.write();
        match chats.get_mut(&info.id) {
            Some(existing) => {
                if !info.name.is_empty() && info.name != info.id && existing.info.name != info.name
                {
                    existing.info.name = info.name;
                }
                false
            },
            None => {
                trace!(chat_id = %info.id, "conversation registered");
                chats.insert(info.id.clone(), Conversation::new(info));
                true
            },
        }
    }

    /// Append to a conversation's history, registering it by id if needed.
    pub fn push_message(&self, chat_id: &str, message: StoredMessage) {
        let mut chats = self.write();
        let chat = chats
            .entry(chat_id.to_string())
            .or_insert_with(|| Conversation::new(ChatInfo::lite(chat_id)));
        chat.history.push_back(message);
        while chat.history.len() > self.capacity {
            chat.history.pop_front();
        }
    }

    /// History of a conversation in arrival order.
    ///
    /// Inbound timestamps come from the sender's device and outbound ones
    /// from the local clock, so arrival is the only order both agree on.
    pub fn history(&self, chat_id: &str) -> Vec<StoredMessage> {
        self.read()
            .get(chat_id)
            .map(|c| c.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.read().contains_key(chat_id)
    }

    pub fn chat(&self, chat_id: &str) -> Option<ChatInfo> {
        self.read().get(chat_id).map(|c| c.info.clone())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop a conversation and its history. Returns whether it existed.
    pub fn remove(&self, chat_id: &str) -> bool {
        self.write().remove(chat_id).is_some()
    }

    /// Every registered conversation, most recently active first.
    pub fn chats(&self) -> Vec<ChatInfo> {
        let chats = self.read();
        let mut entries: Vec<&Conversation> = chats.values().collect();
        entries.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then_with(|| a.info.name.cmp(&b.info.name))
        });
        entries.into_iter().map(|c| c.info.clone()).collect()
    }

    /// Conversations not in `hidden`, most recently active first.
    pub fn visible_chats(&self, hidden: &FlagSet) -> Vec<ChatInfo> {
        self.chats()
            .into_iter()
            .filter(|c| !hidden.contains(&c.id))
            .collect()
    }
}
