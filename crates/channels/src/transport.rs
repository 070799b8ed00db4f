use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::Result;

/// Connection state reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    /// Pairing, opening, reloading, or anything else the client reports.
    Other(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Conversation metadata as the transport or the panel knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    pub id: String,
    pub name: String,
    pub is_group: bool,
}

impl ChatInfo {
    /// Placeholder metadata for a conversation only known by id.
    pub fn lite(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            is_group: false,
        }
    }
}

/// An attachment ready to hand to the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mime_type: String,
    pub filename: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPayload")
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .field("len", &self.data.len())
            .finish()
    }
}

impl MediaPayload {
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

/// Per-send media options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaOptions {
    pub caption: Option<String>,
    /// Deliver audio as a voice note rather than a file.
    pub as_voice: bool,
}

/// Result of a successful transport send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentMessage {
    /// Transport-assigned id, when the client reports one.
    pub id: Option<String>,
}

/// Capabilities wapanel needs from the messaging client.
///
/// Implementations wrap a single automation session; calls are not safe to
/// interleave, which is why every outbound call goes through
/// [`OutboundDispatcher`](crate::OutboundDispatcher).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Current connection state.
    async fn state(&self) -> Result<ConnectionState>;

    /// Resolve a conversation handle. `Ok(None)` means not materialized yet.
    async fn resolve_chat(&self, chat_id: &str) -> Result<Option<ChatInfo>>;

    /// Whether the contact is in the account's address book.
    async fn is_known_contact(&self, contact_id: &str) -> Result<bool>;

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<SentMessage>;

    async fn send_media(
        &self,
        chat_id: &str,
        media: &MediaPayload,
        options: &MediaOptions,
    ) -> Result<SentMessage>;

    /// Show the "composing" presence in a conversation.
    async fn set_typing(&self, chat_id: &str) -> Result<()>;

    /// Clear any presence previously set with [`Transport::set_typing`].
    async fn clear_typing(&self, chat_id: &str) -> Result<()>;
}
