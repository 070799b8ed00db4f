//! Post-reply action chains.

use std::{sync::Arc, time::Duration};

use {
    serde::{Deserialize, Deserializer, Serialize},
    tracing::{debug, warn},
    wapanel_channels::{DispatchError, MediaOptions, MediaRef, OutboundDispatcher},
};

#[cfg(feature = "metrics")]
use wapanel_metrics::{auto_reply as auto_reply_metrics, counter, labels};

use crate::{
    media::{MediaError, MediaResolver},
    notify::OutboundRecorder,
};

/// Default hold time for a typing indicator without `ms`.
pub const DEFAULT_TYPING_MS: u64 = 800;

/// One step of a rule's follow-up choreography.
///
/// Wire format: `{"do": "delay", "ms": 1500}`, `{"do": "typing"}`,
/// `{"do": "text", "text": "..."}`, `{"do": "audio", "file": "hi.ogg", "asVoice": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "do", rename_all = "lowercase")]
pub enum Action {
    Delay {
        #[serde(default, deserialize_with = "delay_ms")]
        ms: u64,
    },
    Typing {
        #[serde(
            default,
            deserialize_with = "typing_ms",
            skip_serializing_if = "Option::is_none"
        )]
        ms: Option<u64>,
    },
    Text {
        #[serde(default, deserialize_with = "scalar_text")]
        text: String,
    },
    Audio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, rename = "asVoice")]
        as_voice: bool,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delay { .. } => "delay",
            Self::Typing { .. } => "typing",
            Self::Text { .. } => "text",
            Self::Audio { .. } => "audio",
        }
    }
}

/// Where an audio action's payload comes from. A file wins over a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    File(String),
    Url(String),
}

impl AudioSource {
    pub fn from_parts(file: Option<&str>, url: Option<&str>) -> Option<Self> {
        let non_blank = |s: &str| !s.trim().is_empty();
        match (file.filter(|f| non_blank(f)), url.filter(|u| non_blank(u))) {
            (Some(file), _) => Some(Self::File(file.to_string())),
            (None, Some(url)) => Some(Self::Url(url.to_string())),
            (None, None) => None,
        }
    }
}

/// Milliseconds from a JSON number or numeric string. Negative, fractional
/// parts and anything unparseable are clamped or dropped.
fn loose_ms(value: Option<serde_json::Value>) -> Option<u64> {
    let millis = match value? {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (millis.is_finite() && millis > 0.0).then(|| millis as u64)
}

fn delay_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(loose_ms(Option::deserialize(deserializer)?).unwrap_or(0))
}

/// `None` (runner default) when missing, zero or unparseable.
fn typing_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(loose_ms(Option::deserialize(deserializer)?))
}

/// Strings pass through; numbers and booleans are rendered as text.
fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

/// Deserialize an action list, dropping entries that are not valid actions.
pub(crate) fn deserialize_actions<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Action>, D::Error> {
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<Action>(value) {
            Ok(action) => Some(action),
            Err(e) => {
                warn!(action = index, error = %e, "ignoring unrecognized action");
                None
            },
        })
        .collect())
}

/// Why a single action did not complete.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("action has nothing to send")]
    Empty,
}

/// What happened to one action of a chain.
#[derive(Debug)]
pub struct ActionReport {
    pub index: usize,
    pub kind: &'static str,
    pub result: Result<(), ActionError>,
}

impl ActionReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs action chains against a conversation.
///
/// A chain never fails as a whole: each action's error is logged, reported
/// and the next action runs. Delays only suspend the calling task.
pub struct ActionRunner {
    dispatcher: Arc<OutboundDispatcher>,
    media: MediaResolver,
    recorder: Arc<OutboundRecorder>,
    typing_default: Duration,
}

impl ActionRunner {
    pub fn new(
        dispatcher: Arc<OutboundDispatcher>,
        media: MediaResolver,
        recorder: Arc<OutboundRecorder>,
    ) -> Self {
        Self {
            dispatcher,
            media,
            recorder,
            typing_default: Duration::from_millis(DEFAULT_TYPING_MS),
        }
    }

    #[must_use]
    pub fn with_typing_default(mut self, hold: Duration) -> Self {
        self.typing_default = hold;
        self
    }

    pub async fn run(&self, chat_id: &str, actions: &[Action]) -> Vec<ActionReport> {
        let mut reports = Vec::with_capacity(actions.len());
        for (index, action) in actions.iter().enumerate() {
            let result = self.run_one(chat_id, action).await;
            if let Err(ref e) = result {
                warn!(chat_id, action = index, kind = action.kind(), error = %e, "action failed");
                #[cfg(feature = "metrics")]
                counter!(
                    auto_reply_metrics::ACTION_FAILURES_TOTAL,
                    labels::ACTION => action.kind()
                )
                .increment(1);
            }
            reports.push(ActionReport {
                index,
                kind: action.kind(),
                result,
            });
        }
        reports
    }

    async fn run_one(&self, chat_id: &str, action: &Action) -> Result<(), ActionError> {
        match action {
            Action::Delay { ms } => {
                debug!(chat_id, ms, "action delay");
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            },
            Action::Typing { ms } => {
                let hold = ms.map_or(self.typing_default, Duration::from_millis);
                self.dispatcher.set_typing(chat_id, true).await?;
                tokio::time::sleep(hold).await;
                self.dispatcher.set_typing(chat_id, false).await?;
                Ok(())
            },
            Action::Text { text } => {
                if text.trim().is_empty() {
                    return Err(ActionError::Empty);
                }
                let sent = self.dispatcher.send_text(chat_id, text).await?;
                self.recorder
                    .record(chat_id, sent.id, Some(text.clone()), None)
                    .await;
                Ok(())
            },
            Action::Audio {
                file,
                url,
                as_voice,
            } => {
                let source = AudioSource::from_parts(file.as_deref(), url.as_deref())
                    .ok_or(ActionError::Empty)?;
                let payload = self.media.resolve(&source).await?;
                let media_ref = MediaRef {
                    mime_type: Some(payload.mime_type.clone()),
                    filename: Some(payload.filename.clone()),
                    url: match &source {
                        AudioSource::Url(url) => Some(url.clone()),
                        AudioSource::File(_) => None,
                    },
                };
                let options = MediaOptions {
                    caption: None,
                    as_voice: *as_voice,
                };
                let sent = self
                    .dispatcher
                    .send_media(chat_id, &payload, &options)
                    .await?;
                self.recorder
                    .record(chat_id, sent.id, None, Some(media_ref))
                    .await;
                Ok(())
            },
        }
    }
}
