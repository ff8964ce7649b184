//! Common surface of the realtime and polling transports.

use std::fmt;

use tapline_core::types::id::{ConversationId, MessageId};
use tapline_core::types::message::MessageStatus;

use crate::event::EventBus;

/// Which leaf transport produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Server-push websocket.
    Realtime,
    /// Fixed-interval REST polling.
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Realtime => f.write_str("realtime"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// A leaf transport driven by the supervisor.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Which transport this is.
    fn kind(&self) -> TransportKind;

    /// Bus the transport emits on.
    fn events(&self) -> &EventBus;

    /// Start delivering events for a conversation.
    ///
    /// Returns `false` when nothing changed or nothing could be sent.
    fn watch(&self, conversation_id: &ConversationId) -> bool;

    /// Stop delivering events for a conversation.
    fn unwatch(&self, conversation_id: &ConversationId) -> bool;

    /// Push a typing indicator. `false` means dropped, not queued.
    fn send_typing(&self, conversation_id: &ConversationId, is_typing: bool) -> bool;

    /// Push a delivery status change. `false` means dropped, not queued.
    fn send_message_status(&self, message_id: &MessageId, status: MessageStatus) -> bool;

    /// Stop all work. Listeners registered on [`Transport::events`] survive.
    fn shutdown(&self);
}
