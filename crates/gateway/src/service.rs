use std::{sync::Arc, time::Duration};

use {
    tracing::{info, warn},
    wapanel_auto_reply::{
        ActionRunner, AutoReplyEngine, AutoReplyState, BotUpload, MediaResolver, OutboundRecorder,
        TriggerPolicy,
    },
    wapanel_channels::{ChatInfo, DispatchPolicy, OutboundDispatcher, PanelEventSink, Transport},
    wapanel_common::ids::normalize_chat_input,
    wapanel_config::{AutoReplyConfig, DispatchConfig, PanelConfig},
    wapanel_sessions::{ConversationStore, FlagSets, StoredMessage},
};

use crate::error::{PanelError, Result};

/// Dispatcher budget from its config section.
pub fn dispatch_policy(config: &DispatchConfig) -> DispatchPolicy {
    DispatchPolicy {
        retries: config.retries,
        backoff: Duration::from_millis(config.backoff_ms),
        ready_polls: config.ready_polls,
        ready_interval: Duration::from_millis(config.ready_interval_ms),
        chat_polls: config.chat_polls,
        chat_interval: Duration::from_millis(config.chat_interval_ms),
    }
}

/// One-shot trigger policy from the auto-reply config section.
pub fn trigger_policy(config: &AutoReplyConfig) -> TriggerPolicy {
    TriggerPolicy {
        consume_on_no_match: config.consume_on_no_match,
        consume_on_send_failure: config.consume_on_send_failure,
    }
}

/// Process-wide panel state and the operations on it.
pub struct PanelService {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) sink: Arc<dyn PanelEventSink>,
    pub(crate) store: Arc<ConversationStore>,
    pub(crate) flags: Arc<FlagSets>,
    pub(crate) dispatcher: Arc<OutboundDispatcher>,
    pub(crate) recorder: Arc<OutboundRecorder>,
    pub(crate) engine: Arc<AutoReplyEngine>,
    pub(crate) country_code: String,
}

impl PanelService {
    /// Build the service: load flag sets from the data directory and apply
    /// the startup bot configuration, if one is configured.
    pub fn from_config(
        config: &PanelConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn PanelEventSink>,
    ) -> Result<Self> {
        let data_dir = config.resolved_data_dir();
        let media_dir = config.resolved_media_dir();
        let flags = Arc::new(FlagSets::load(&data_dir));
        info!(
            data_dir = %data_dir.display(),
            media_dir = %media_dir.display(),
            triggered = flags.triggered.len(),
            hidden = flags.hidden.len(),
            overrides = flags.overrides.len(),
            "panel state loaded"
        );

        let store = Arc::new(ConversationStore::new(config.history_capacity));
        let dispatcher = Arc::new(OutboundDispatcher::new(
            Arc::clone(&transport),
            dispatch_policy(&config.dispatch),
        ));
        let recorder = Arc::new(OutboundRecorder::new(Arc::clone(&store), Arc::clone(&sink)));

        let auto_reply = &config.auto_reply;
        let actions = ActionRunner::new(
            Arc::clone(&dispatcher),
            MediaResolver::new(
                media_dir,
                Duration::from_secs(auto_reply.audio_fetch_timeout_secs),
            ),
            Arc::clone(&recorder),
        )
        .with_typing_default(Duration::from_millis(auto_reply.typing_default_ms));

        let state = Arc::new(AutoReplyState::new());
        if let Some(path) = &auto_reply.rules_file {
            let status = state.configure(BotUpload::from_file(path)?);
            info!(path = %path.display(), rules = status.rules, "startup bot configuration applied");
        }

        let engine = Arc::new(
            AutoReplyEngine::new(
                state,
                Arc::clone(&flags),
                Arc::clone(&dispatcher),
                Arc::clone(&recorder),
                actions,
            )
            .with_policy(trigger_policy(auto_reply)),
        );

        Ok(Self {
            transport,
            sink,
            store,
            flags,
            dispatcher,
            recorder,
            engine,
            country_code: config.default_country_code.clone(),
        })
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn flags(&self) -> &Arc<FlagSets> {
        &self.flags
    }

    pub fn engine(&self) -> &Arc<AutoReplyEngine> {
        &self.engine
    }

    pub fn dispatcher(&self) -> &Arc<OutboundDispatcher> {
        &self.dispatcher
    }

    /// Conversations shown in the panel list.
    pub fn visible_chats(&self) -> Vec<ChatInfo> {
        self.store.visible_chats(&self.flags.hidden)
    }

    /// History of a conversation, addressed by id or phone number.
    pub fn messages(&self, chat_or_number: &str) -> Result<Vec<StoredMessage>> {
        let chat_id = self.normalize(chat_or_number)?;
        Ok(self.store.history(&chat_id))
    }

    pub(crate) fn normalize(&self, chat_or_number: &str) -> Result<String> {
        normalize_chat_input(chat_or_number, &self.country_code)
            .ok_or_else(|| PanelError::invalid_input("missing or invalid chat id or number"))
    }

    /// Log a flag set write failure; the in-memory change stands.
    pub(crate) fn note_persist<T>(result: wapanel_sessions::Result<T>, chat_id: &str) {
        if let Err(e) = result {
            warn!(chat_id, error = %e, "flag change kept in memory only");
        }
    }
}
