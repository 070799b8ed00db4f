/// Config schema types (storage locations, dispatch policy, auto-reply policy).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Directory holding the persisted flag sets. Defaults to the platform
    /// data directory, or `./data` when none can be determined.
    pub data_dir: Option<PathBuf>,
    /// Base directory for relative audio action files. Defaults to
    /// `<data_dir>/media`.
    pub media_dir: Option<PathBuf>,
    /// Country code prepended to bare phone numbers. Defaults to "52".
    pub default_country_code: String,
    /// Messages retained per conversation. Defaults to 200.
    pub history_capacity: usize,
    pub dispatch: DispatchConfig,
    pub auto_reply: AutoReplyConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            media_dir: None,
            default_country_code: "52".into(),
            history_capacity: 200,
            dispatch: DispatchConfig::default(),
            auto_reply: AutoReplyConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Effective data directory.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "wapanel")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Effective media directory for audio actions.
    pub fn resolved_media_dir(&self) -> PathBuf {
        self.media_dir
            .clone()
            .unwrap_or_else(|| self.resolved_data_dir().join("media"))
    }
}

/// Outbound retry and readiness polling budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Retries after the first attempt for transient failures. Defaults to 5.
    pub retries: u32,
    /// Pause between retries in milliseconds. Defaults to 700.
    pub backoff_ms: u64,
    /// Readiness polls before giving up. Defaults to 40.
    pub ready_polls: u32,
    /// Interval between readiness polls in milliseconds. Defaults to 250.
    pub ready_interval_ms: u64,
    /// Conversation materialization polls. Defaults to 10.
    pub chat_polls: u32,
    /// Interval between materialization polls in milliseconds. Defaults to 300.
    pub chat_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff_ms: 700,
            ready_polls: 40,
            ready_interval_ms: 250,
            chat_polls: 10,
            chat_interval_ms: 300,
        }
    }
}

/// Auto-reply behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoReplyConfig {
    /// Spend the one-shot trigger even when no rule or welcome text applies.
    pub consume_on_no_match: bool,
    /// Spend the one-shot trigger even when the automated reply fails to send.
    pub consume_on_send_failure: bool,
    /// Typing indicator hold when an action omits `ms`. Defaults to 800.
    pub typing_default_ms: u64,
    /// Timeout for fetching remote audio in seconds. Defaults to 30.
    pub audio_fetch_timeout_secs: u64,
    /// Bot upload (JSON with `welcome` and `rules`) applied at startup.
    pub rules_file: Option<PathBuf>,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            consume_on_no_match: true,
            consume_on_send_failure: true,
            typing_default_ms: 800,
            audio_fetch_timeout_secs: 30,
            rules_file: None,
        }
    }
}
