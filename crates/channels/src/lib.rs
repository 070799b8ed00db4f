//! Messaging transport contract and outbound delivery.
//!
//! The transport (a browser-automation messaging client) is external; this
//! crate defines the capabilities wapanel needs from it, the inbound message
//! shape it must provide, the events pushed to the operator panel, and the
//! [`OutboundDispatcher`] that serializes and retries every outbound call.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod inbound;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod transport;

pub use {
    dispatch::{DispatchError, DispatchPolicy, OutboundDispatcher, is_retryable},
    error::{Error, Result},
    events::{BroadcastEventSink, PanelEvent, PanelEventSink},
    inbound::{InboundMessage, MediaRef, SidecarInbound},
    transport::{ChatInfo, ConnectionState, MediaOptions, MediaPayload, SentMessage, Transport},
};
