//! Panel service: the glue between the transport, the conversation store,
//! the durable flag sets and the auto-reply engine.
//!
//! Lifecycle:
//! 1. Load config, resolve data and media directories
//! 2. Load flag sets, optional startup bot configuration
//! 3. Transport reports ready → [`PanelService::on_ready`]
//! 4. Each inbound message → [`PanelService::on_inbound`]
//!
//! Operator actions (direct sends, forget chat, stranger overrides, bot
//! configuration) are methods on [`PanelService`] and surface failures as
//! [`PanelError`]; automated replies only log theirs.

pub mod admin;
pub mod error;
pub mod inbound;
pub mod lookup;
pub mod outbound;
pub mod service;

pub use {
    admin::OverrideList,
    error::{PanelError, Result},
    inbound::InboundReceipt,
    lookup::ChatLookup,
    service::{PanelService, dispatch_policy, trigger_policy},
};
