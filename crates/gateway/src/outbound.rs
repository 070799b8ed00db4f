use {
    tracing::{debug, info},
    wapanel_channels::{ChatInfo, MediaOptions, MediaPayload, MediaRef, PanelEvent},
    wapanel_sessions::StoredMessage,
};

use crate::{
    error::{PanelError, Result},
    service::PanelService,
};

impl PanelService {
    /// Operator send to an existing conversation or a phone number.
    pub async fn send_text(&self, chat_or_number: &str, text: &str) -> Result<StoredMessage> {
        let chat_id = self.normalize(chat_or_number)?;
        let text = non_blank(text)?;

        let sent = self.dispatcher.send_text(&chat_id, text).await?;
        self.store.ensure_chat(ChatInfo::lite(&chat_id));
        debug!(chat_id, "operator message sent");
        Ok(self
            .recorder
            .record(&chat_id, sent.id, Some(text.to_string()), None)
            .await)
    }

    /// Start a conversation with a contact.
    ///
    /// The contact is added to the unknown-contact overrides, so the bot still
    /// answers their first reply even if they are in the address book.
    pub async fn send_to(&self, contact: &str, text: &str) -> Result<StoredMessage> {
        let chat_id = self.normalize(contact)?;
        let text = non_blank(text)?;

        let sent = self.dispatcher.send_text(&chat_id, text).await?;
        Self::note_persist(self.flags.overrides.insert(&chat_id), &chat_id);

        let info = match self.transport.resolve_chat(&chat_id).await {
            Ok(Some(info)) => info,
            _ => ChatInfo::lite(&chat_id),
        };
        self.store.ensure_chat(info);
        if let Some(chat) = self.store.chat(&chat_id) {
            self.sink.emit(PanelEvent::ChatCreated { chat }).await;
        }
        self.sink
            .emit(PanelEvent::Chats {
                chats: self.visible_chats(),
            })
            .await;
        info!(chat_id, "conversation started by operator");

        Ok(self
            .recorder
            .record(&chat_id, sent.id, Some(text.to_string()), None)
            .await)
    }

    /// Operator attachment send. Audio can go out as a voice note.
    pub async fn send_media(
        &self,
        chat_or_number: &str,
        media: MediaPayload,
        caption: Option<String>,
        as_voice: bool,
    ) -> Result<StoredMessage> {
        let chat_id = self.normalize(chat_or_number)?;
        if media.data.is_empty() {
            return Err(PanelError::invalid_input("empty attachment"));
        }
        let caption = caption.filter(|c| !c.trim().is_empty());
        let options = MediaOptions {
            caption: caption.clone(),
            as_voice: as_voice && media.is_audio(),
        };

        let sent = self
            .dispatcher
            .send_media(&chat_id, &media, &options)
            .await?;
        self.store.ensure_chat(ChatInfo::lite(&chat_id));
        debug!(chat_id, filename = %media.filename, "operator media sent");

        let media_ref = MediaRef {
            mime_type: Some(media.mime_type),
            filename: Some(media.filename),
            url: None,
        };
        Ok(self
            .recorder
            .record(&chat_id, sent.id, caption, Some(media_ref))
            .await)
    }
}

fn non_blank(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PanelError::invalid_input("message text is empty"));
    }
    Ok(text)
}
