//! Keyword rules and the first-match evaluator.

use std::fmt;

use {
    regex::{Regex, RegexBuilder},
    serde::{Deserialize, Deserializer, Serialize, Serializer},
    tracing::{debug, warn},
};

use crate::actions::{Action, deserialize_actions};

/// Compiled regexes larger than this are rejected as invalid rules.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// How a rule's `match` pattern is compared with the message text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchKind {
    /// Whole text equals the pattern, ignoring case.
    Equals,
    /// Text contains the pattern, ignoring case.
    #[default]
    Includes,
    /// Case-insensitive regex found anywhere in the text. Linear-time
    /// dialect: look-around and backreferences are compile errors.
    Regex,
    /// Any other `type` value. Never matches.
    Unknown,
}

impl Serialize for MatchKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MatchKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map_or(Self::Includes, Self::parse))
    }
}

impl MatchKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "includes" => Self::Includes,
            "equals" => Self::Equals,
            "regex" => Self::Regex,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equals => "equals",
            Self::Includes => "includes",
            Self::Regex => "regex",
            Self::Unknown => "unknown",
        })
    }
}

/// A pattern-to-reply mapping with an optional follow-up action chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type", default)]
    pub kind: MatchKind,
    #[serde(rename = "match", default)]
    pub pattern: String,
    pub reply: String,
    #[serde(
        default,
        deserialize_with = "deserialize_actions",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(kind: MatchKind, pattern: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            reply: reply.into(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// The reply as it will be sent, or `None` when it is blank.
    pub fn reply_text(&self) -> Option<&str> {
        let reply = self.reply.trim();
        (!reply.is_empty()).then_some(reply)
    }
}

/// A rule whose pattern could not be evaluated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleError {
    #[error("rule {index}: invalid regex {pattern:?}: {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {index}: unsupported match type")]
    UnknownKind { index: usize },
}

impl RuleError {
    pub fn index(&self) -> usize {
        match self {
            Self::InvalidPattern { index, .. } | Self::UnknownKind { index } => *index,
        }
    }
}

enum Matcher {
    Equals(String),
    Includes(String),
    Regex(Regex),
    Invalid,
}

/// A successful match: the rule and its position in declaration order.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub index: usize,
    pub rule: &'a Rule,
}

/// Rules compiled once per configuration, evaluated in declaration order.
///
/// Rules that fail to compile are kept as non-matching entries and reported
/// through [`RuleSet::diagnostics`]; they never prevent later rules from
/// matching.
pub struct RuleSet {
    rules: Vec<Rule>,
    matchers: Vec<Matcher>,
    diagnostics: Vec<RuleError>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.rules.len())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut diagnostics = Vec::new();
        let matchers = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| match compile(index, rule) {
                Ok(matcher) => matcher,
                Err(e) => {
                    warn!(rule = index, error = %e, "rule disabled");
                    diagnostics.push(e);
                    Matcher::Invalid
                },
            })
            .collect();
        Self {
            rules,
            matchers,
            diagnostics,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn diagnostics(&self) -> &[RuleError] {
        &self.diagnostics
    }

    /// First rule matching `text` (trimmed), if any.
    pub fn find(&self, text: &str) -> Option<RuleMatch<'_>> {
        let text = text.trim();
        let lowered = text.to_lowercase();
        let index = self.matchers.iter().position(|m| match m {
            Matcher::Equals(p) => lowered == *p,
            Matcher::Includes(p) => lowered.contains(p.as_str()),
            Matcher::Regex(re) => re.is_match(text),
            Matcher::Invalid => false,
        })?;
        debug!(rule = index, "rule matched");
        Some(RuleMatch {
            index,
            rule: &self.rules[index],
        })
    }
}

fn compile(index: usize, rule: &Rule) -> Result<Matcher, RuleError> {
    match rule.kind {
        MatchKind::Equals => Ok(Matcher::Equals(rule.pattern.to_lowercase())),
        MatchKind::Includes => Ok(Matcher::Includes(rule.pattern.to_lowercase())),
        MatchKind::Regex => RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map(Matcher::Regex)
            .map_err(|source| RuleError::InvalidPattern {
                index,
                pattern: rule.pattern.clone(),
                source,
            }),
        MatchKind::Unknown => Err(RuleError::UnknownKind { index }),
    }
}
