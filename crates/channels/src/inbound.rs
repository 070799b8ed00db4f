//! Inbound message capability trait and the sidecar adapter.

use serde::{Deserialize, Serialize};

/// Reference to an attachment carried by a message. Content is not handled
/// here; only its presence matters for the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// What the pipeline needs to know about an inbound message.
///
/// Each concrete transport provides an adapter implementing this trait.
pub trait InboundMessage: Send + Sync {
    /// Transport message id, if already assigned.
    fn id(&self) -> Option<&str>;
    /// Conversation the message belongs to.
    fn chat_id(&self) -> &str;
    /// Display name of the conversation, if the transport knows it.
    fn chat_name(&self) -> Option<&str>;
    fn is_group(&self) -> bool;
    /// Id of the sending contact.
    fn sender_id(&self) -> &str;
    fn body(&self) -> Option<&str>;
    fn is_from_self(&self) -> bool;
    /// Address-book classification of the sender; `None` when the transport
    /// did not include it and it has to be queried.
    fn sender_known(&self) -> Option<bool>;
    fn media(&self) -> Option<&MediaRef>;
    /// Capture time in seconds since the epoch.
    fn timestamp(&self) -> Option<i64>;
}

/// Inbound message as posted by the browser-automation sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarInbound {
    #[serde(default)]
    pub message_id: Option<String>,
    pub chat_jid: String,
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    pub sender_jid: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub is_my_contact: Option<bool>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl InboundMessage for SidecarInbound {
    fn id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    fn chat_id(&self) -> &str {
        &self.chat_jid
    }

    fn chat_name(&self) -> Option<&str> {
        self.chat_name.as_deref().or(self.sender_name.as_deref())
    }

    fn is_group(&self) -> bool {
        self.is_group
    }

    fn sender_id(&self) -> &str {
        &self.sender_jid
    }

    fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    fn is_from_self(&self) -> bool {
        self.from_me
    }

    fn sender_known(&self) -> Option<bool> {
        self.is_my_contact
    }

    fn media(&self) -> Option<&MediaRef> {
        self.media.as_ref()
    }

    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}
