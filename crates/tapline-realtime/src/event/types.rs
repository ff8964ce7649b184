//! Normalized event vocabulary shared by both transports and the supervisor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tapline_core::types::id::{ConversationId, MessageId, UserId};
use tapline_core::types::message::{Message, MessageStatus, SenderRole};

use crate::supervisor::status::ConnectionStatus;

/// Longest preview carried by a [`ConversationSummary`], in characters.
const PREVIEW_CHARS: usize = 80;

/// Someone started or stopped typing in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingEvent {
    /// Conversation being typed in.
    pub conversation_id: ConversationId,
    /// Who is typing, when the backend says.
    pub user_id: Option<UserId>,
    /// Started (`true`) or stopped (`false`).
    pub is_typing: bool,
}

/// A message moved along its delivery lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Message whose status changed.
    pub message_id: MessageId,
    /// Conversation, when the backend says.
    pub conversation_id: Option<ConversationId>,
    /// New status.
    pub status: MessageStatus,
}

/// Conversation list entry refreshed after a new message arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation that changed.
    pub conversation_id: ConversationId,
    /// Newest message id.
    pub last_message_id: MessageId,
    /// Truncated text of the newest message.
    pub preview: String,
    /// Who wrote the newest message.
    pub last_sender_role: SenderRole,
    /// When the newest message was written.
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    /// Summary of a conversation whose newest message is `message`.
    pub fn from_message(message: &Message) -> Self {
        let mut preview: String = message.content.chars().take(PREVIEW_CHARS).collect();
        if message.content.chars().count() > PREVIEW_CHARS {
            preview.push('…');
        }

        Self {
            conversation_id: message.conversation_id.clone(),
            last_message_id: message.id.clone(),
            preview,
            last_sender_role: message.sender_role,
            updated_at: message.timestamp,
        }
    }
}

/// Every event a transport or the supervisor can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The realtime connection is up.
    Connected,
    /// The realtime connection went down.
    Disconnected {
        /// Why it closed.
        reason: String,
    },
    /// A message the UI has not seen yet.
    NewMessage(Message),
    /// Typing indicator.
    Typing(TypingEvent),
    /// Delivery status change.
    MessageStatus(StatusEvent),
    /// Conversation list entry changed.
    ConversationUpdated(ConversationSummary),
    /// A realtime attempt failed or the connection errored.
    ConnectionError {
        /// Error description.
        message: String,
    },
    /// No credential was available, nothing was attempted.
    NoToken,
    /// The realtime attempt budget is spent.
    MaxAttemptsReached,
    /// The realtime transport cannot work in this environment.
    WebsocketNotSupported,
    /// The supervisor's connection status changed.
    StatusChanged {
        /// Previous status.
        from: ConnectionStatus,
        /// New status.
        to: ConnectionStatus,
    },
}

impl TransportEvent {
    /// The event's discriminant, used for subscriptions.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::NewMessage(_) => EventKind::NewMessage,
            Self::Typing(_) => EventKind::Typing,
            Self::MessageStatus(_) => EventKind::MessageStatus,
            Self::ConversationUpdated(_) => EventKind::ConversationUpdated,
            Self::ConnectionError { .. } => EventKind::ConnectionError,
            Self::NoToken => EventKind::NoToken,
            Self::MaxAttemptsReached => EventKind::MaxAttemptsReached,
            Self::WebsocketNotSupported => EventKind::WebsocketNotSupported,
            Self::StatusChanged { .. } => EventKind::StatusChanged,
        }
    }

    /// Conversation the event concerns, if it concerns one.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::NewMessage(message) => Some(&message.conversation_id),
            Self::Typing(typing) => Some(&typing.conversation_id),
            Self::MessageStatus(status) => status.conversation_id.as_ref(),
            Self::ConversationUpdated(summary) => Some(&summary.conversation_id),
            _ => None,
        }
    }
}

/// Payload-free event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// See [`TransportEvent::Connected`].
    Connected,
    /// See [`TransportEvent::Disconnected`].
    Disconnected,
    /// See [`TransportEvent::NewMessage`].
    NewMessage,
    /// See [`TransportEvent::Typing`].
    Typing,
    /// See [`TransportEvent::MessageStatus`].
    MessageStatus,
    /// See [`TransportEvent::ConversationUpdated`].
    ConversationUpdated,
    /// See [`TransportEvent::ConnectionError`].
    ConnectionError,
    /// See [`TransportEvent::NoToken`].
    NoToken,
    /// See [`TransportEvent::MaxAttemptsReached`].
    MaxAttemptsReached,
    /// See [`TransportEvent::WebsocketNotSupported`].
    WebsocketNotSupported,
    /// See [`TransportEvent::StatusChanged`].
    StatusChanged,
}

impl EventKind {
    /// Name as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::NewMessage => "newMessage",
            Self::Typing => "typing",
            Self::MessageStatus => "messageStatus",
            Self::ConversationUpdated => "conversationUpdated",
            Self::ConnectionError => "connectionError",
            Self::NoToken => "noToken",
            Self::MaxAttemptsReached => "maxAttemptsReached",
            Self::WebsocketNotSupported => "websocketNotSupported",
            Self::StatusChanged => "statusChanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
