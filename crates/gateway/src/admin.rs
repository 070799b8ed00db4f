use {
    serde::Serialize,
    serde_json::Value,
    tracing::info,
    wapanel_auto_reply::{BotStatus, BotUpload},
    wapanel_channels::PanelEvent,
};

use crate::{
    error::{PanelError, Result},
    lookup::ChatLookup,
    service::PanelService,
};

/// Current unknown-contact overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideList {
    pub count: usize,
    pub list: Vec<String>,
}

impl PanelService {
    /// Replace the bot configuration with a validated upload and enable it.
    pub fn configure_bot(&self, upload: Value) -> Result<BotStatus> {
        let upload = BotUpload::from_value(upload)?;
        Ok(self.engine.state().configure(upload))
    }

    pub fn disable_bot(&self) -> BotStatus {
        self.engine.state().disable()
    }

    pub fn bot_status(&self) -> BotStatus {
        self.engine.state().status()
    }

    /// Hide a conversation and reset it as if it had never written.
    ///
    /// It leaves the panel list, its trigger is released, it is treated as an
    /// unknown contact from now on and its history is dropped. A new inbound
    /// message brings it back.
    pub async fn forget_chat(&self, lookup: &ChatLookup) -> Result<String> {
        let chat_id = self.resolve(lookup)?;

        Self::note_persist(self.flags.hidden.insert(&chat_id), &chat_id);
        Self::note_persist(self.flags.triggered.remove(&chat_id), &chat_id);
        Self::note_persist(self.flags.overrides.insert(&chat_id), &chat_id);
        self.store.remove(&chat_id);
        info!(chat_id, "conversation forgotten");

        self.sink
            .emit(PanelEvent::Chats {
                chats: self.visible_chats(),
            })
            .await;
        Ok(chat_id)
    }

    pub fn mark_stranger(&self, lookup: &ChatLookup) -> Result<String> {
        let chat_id = self.resolve(lookup)?;
        Self::note_persist(self.flags.overrides.insert(&chat_id), &chat_id);
        info!(chat_id, "marked as unknown contact");
        Ok(chat_id)
    }

    pub fn unmark_stranger(&self, lookup: &ChatLookup) -> Result<String> {
        let chat_id = self.resolve(lookup)?;
        Self::note_persist(self.flags.overrides.remove(&chat_id), &chat_id);
        info!(chat_id, "unknown contact override removed");
        Ok(chat_id)
    }

    pub fn overrides(&self) -> OverrideList {
        let list = self.flags.overrides.list();
        OverrideList {
            count: list.len(),
            list,
        }
    }

    fn resolve(&self, lookup: &ChatLookup) -> Result<String> {
        lookup
            .resolve(&self.store, &self.country_code)
            .ok_or_else(|| PanelError::not_found("no conversation matches that name, number or id"))
    }
}
