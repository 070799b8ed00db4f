//! Conversation state kept by the panel.
//!
//! [`ConversationStore`] holds conversation metadata and a bounded message
//! history in memory. [`FlagSets`] are the three durable id sets (triggered,
//! hidden, unknown-contact overrides), each stored as a JSON array file and
//! rewritten in full on every change with file locking.

pub mod error;
pub mod flags;
pub mod store;

pub use {
    error::{Error, Result},
    flags::{FlagKind, FlagSet, FlagSets},
    store::{ConversationStore, DEFAULT_HISTORY_CAPACITY, StoredMessage},
};
