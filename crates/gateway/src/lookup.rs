use {
    serde::Deserialize,
    wapanel_common::ids::phone_to_chat_id,
    wapanel_sessions::ConversationStore,
};

/// How an operator designates a conversation: by id, phone number or
/// (part of) its display name. Fields are tried in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLookup {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ChatLookup {
    pub fn chat_id(id: impl Into<String>) -> Self {
        Self {
            chat_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn number(number: impl Into<String>) -> Self {
        Self {
            number: Some(number.into()),
            ..Default::default()
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Resolve to a conversation id.
    ///
    /// Names match case-insensitively: a single substring match wins, then
    /// an exact name among several matches, and only when no name matches at
    /// all, the first conversation whose id contains the text.
    pub fn resolve(&self, store: &ConversationStore, country_code: &str) -> Option<String> {
        if let Some(id) = self.chat_id.as_deref().map(str::trim)
            && id.contains('@')
        {
            return Some(id.to_string());
        }
        if let Some(id) = self
            .number
            .as_deref()
            .and_then(|n| phone_to_chat_id(n, country_code))
        {
            return Some(id);
        }

        let needle = self.name.as_deref()?.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let chats = store.chats();
        let matches: Vec<_> = chats
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .collect();
        match matches.as_slice() {
            [only] => Some(only.id.clone()),
            [] => chats
                .iter()
                .find(|c| c.id.to_lowercase().contains(&needle))
                .map(|c| c.id.clone()),
            many => many
                .iter()
                .find(|c| c.name.to_lowercase() == needle)
                .map(|c| c.id.clone()),
        }
    }
}
