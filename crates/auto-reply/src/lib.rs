//! Rule-driven automatic first reply.
//!
//! Flow: inbound message → eligibility gate ([`AutoReplyEngine::decide`], which
//! marks the conversation as triggered before anything is awaited) → first
//! matching [`Rule`] or the welcome fallback → reply through the
//! [`OutboundDispatcher`](wapanel_channels::OutboundDispatcher) → the rule's
//! [`Action`] chain.

pub mod actions;
pub mod engine;
pub mod error;
pub mod media;
pub mod notify;
pub mod rules;
pub mod state;

pub use {
    actions::{Action, ActionError, ActionReport, ActionRunner, AudioSource},
    engine::{
        AutoReplyEngine, AutoReplyOutcome, Decision, PlannedReply, ReplyPlan, ReplySource,
        SkipReason, TriggerPolicy,
    },
    error::{Error, Result},
    media::{MediaError, MediaResolver},
    notify::OutboundRecorder,
    rules::{MatchKind, Rule, RuleError, RuleMatch, RuleSet},
    state::{AutoReplyState, BotSnapshot, BotStatus, BotUpload},
};
