//! Bot configuration: enabled flag, welcome fallback and rules.

use std::{
    path::Path,
    sync::{Arc, RwLock},
};

use {
    serde::Serialize,
    serde_json::Value,
    tracing::info,
};

#[cfg(feature = "metrics")]
use wapanel_metrics::{auto_reply as auto_reply_metrics, counter};

use crate::{
    error::{Context, Error, Result},
    rules::{Rule, RuleSet},
};

/// A validated bot configuration upload.
#[derive(Debug, Clone, PartialEq)]
pub struct BotUpload {
    pub welcome: Option<String>,
    pub rules: Vec<Rule>,
}

impl BotUpload {
    /// Validate an upload document: `{"welcome": "...", "rules": [...]}`.
    ///
    /// `rules` must be an array and every rule needs a string `reply`. A
    /// blank welcome is treated as absent.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut doc) = value else {
            return Err(Error::invalid_upload("expected a JSON object"));
        };
        let Some(Value::Array(raw_rules)) = doc.remove("rules") else {
            return Err(Error::invalid_upload("\"rules\" must be an array"));
        };

        let mut rules = Vec::with_capacity(raw_rules.len());
        for (index, raw) in raw_rules.into_iter().enumerate() {
            if !raw.get("reply").is_some_and(Value::is_string) {
                return Err(Error::invalid_upload(format!(
                    "rule {index} needs a string \"reply\""
                )));
            }
            let rule: Rule = serde_json::from_value(sanitize_rule(raw))
                .map_err(|e| Error::invalid_upload(format!("rule {index}: {e}")))?;
            rules.push(rule);
        }

        let welcome = match doc.remove("welcome") {
            Some(Value::String(w)) if !w.trim().is_empty() => Some(w.trim().to_string()),
            _ => None,
        };
        Ok(Self { welcome, rules })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&raw)
    }
}

/// Drop `type`/`match` values of the wrong JSON type so they fall back to
/// their defaults instead of failing the whole upload.
fn sanitize_rule(mut raw: Value) -> Value {
    if let Some(obj) = raw.as_object_mut() {
        for key in ["type", "match"] {
            if obj.get(key).is_some_and(|v| !v.is_string()) {
                obj.remove(key);
            }
        }
        if obj.get("actions").is_some_and(|v| !v.is_array()) {
            obj.remove("actions");
        }
    }
    raw
}

/// Status summary for the administration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotStatus {
    pub enabled: bool,
    /// Number of configured rules.
    pub rules: usize,
    pub welcome: Option<String>,
}

/// Immutable view of the bot configuration at one point in time.
#[derive(Debug, Clone)]
pub struct BotSnapshot {
    pub enabled: bool,
    pub welcome: Option<String>,
    pub rules: Arc<RuleSet>,
}

/// Process-wide bot configuration. Replaced wholesale on every upload.
pub struct AutoReplyState {
    inner: RwLock<BotSnapshot>,
}

impl Default for AutoReplyState {
    fn default() -> Self {
        Self {
            inner: RwLock::new(BotSnapshot {
                enabled: false,
                welcome: None,
                rules: Arc::new(RuleSet::default()),
            }),
        }
    }
}

impl AutoReplyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an upload and enable the bot.
    pub fn configure(&self, upload: BotUpload) -> BotStatus {
        let rules = RuleSet::new(upload.rules);
        info!(
            rules = rules.len(),
            invalid = rules.diagnostics().len(),
            welcome = upload.welcome.is_some(),
            "auto-reply configured"
        );
        #[cfg(feature = "metrics")]
        counter!(auto_reply_metrics::RULE_ERRORS_TOTAL).increment(rules.diagnostics().len() as u64);
        let mut inner = self.write();
        *inner = BotSnapshot {
            enabled: true,
            welcome: upload.welcome,
            rules: Arc::new(rules),
        };
        Self::status_of(&inner)
    }

    /// Turn the bot off, keeping its rules.
    pub fn disable(&self) -> BotStatus {
        let mut inner = self.write();
        inner.enabled = false;
        info!("auto-reply disabled");
        Self::status_of(&inner)
    }

    pub fn status(&self) -> BotStatus {
        Self::status_of(&self.read())
    }

    pub fn snapshot(&self) -> BotSnapshot {
        self.read().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.read().enabled
    }

    fn status_of(snapshot: &BotSnapshot) -> BotStatus {
        BotStatus {
            enabled: snapshot.enabled,
            rules: snapshot.rules.len(),
            welcome: snapshot.welcome.clone(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BotSnapshot> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BotSnapshot> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
