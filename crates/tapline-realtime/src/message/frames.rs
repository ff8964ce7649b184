//! Realtime wire frames exchanged with the messaging backend.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use tapline_core::error::AppError;
use tapline_core::types::id::{ConversationId, MessageId, UserId};
use tapline_core::types::message::{MessageRecord, MessageStatus};

use crate::event::types::{StatusEvent, TransportEvent, TypingEvent};

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A message was posted to a joined conversation.
    NewMessage(MessageRecord),
    /// Typing indicator.
    Typing(TypingPayload),
    /// Delivery status change.
    MessageStatus(StatusPayload),
}

/// Payload of a server `typing` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    /// Conversation being typed in.
    #[serde(alias = "conversation_id")]
    pub conversation_id: String,
    /// Who is typing.
    #[serde(default, alias = "user_id")]
    pub user_id: Option<String>,
    /// Started or stopped.
    #[serde(alias = "is_typing")]
    pub is_typing: bool,
}

/// Payload of a server `message_status` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Message whose status changed.
    #[serde(alias = "message_id")]
    pub message_id: String,
    /// Owning conversation.
    #[serde(default, alias = "conversation_id")]
    pub conversation_id: Option<String>,
    /// New status.
    pub status: String,
}

impl ServerFrame {
    /// Translate into the normalized event vocabulary.
    ///
    /// A `new_message` without `conversationId` is attributed to
    /// `sole_joined`, the only joined conversation, when there is one.
    pub fn into_event(
        self,
        sole_joined: Option<&ConversationId>,
    ) -> Result<TransportEvent, AppError> {
        match self {
            Self::NewMessage(record) => {
                let conversation_id = match (record.conversation_id.clone(), sole_joined) {
                    (Some(id), _) => ConversationId::new(id),
                    (None, Some(joined)) => joined.clone(),
                    (None, None) => {
                        return Err(AppError::validation(format!(
                            "new_message '{}' without conversationId",
                            record.id
                        )));
                    }
                };
                Ok(TransportEvent::NewMessage(
                    record.into_message(&conversation_id)?,
                ))
            }
            Self::Typing(payload) => Ok(TransportEvent::Typing(TypingEvent {
                conversation_id: ConversationId::new(payload.conversation_id),
                user_id: payload.user_id.map(UserId::new),
                is_typing: payload.is_typing,
            })),
            Self::MessageStatus(payload) => Ok(TransportEvent::MessageStatus(StatusEvent {
                message_id: MessageId::new(payload.message_id),
                conversation_id: payload.conversation_id.map(ConversationId::new),
                status: payload.status.parse()?,
            })),
        }
    }
}

/// Frames pushed by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientFrame {
    /// Local user started or stopped typing.
    Typing {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// Started or stopped.
        is_typing: bool,
    },
    /// Local client observed a status change (usually delivered/read).
    MessageStatus {
        /// Message concerned.
        message_id: MessageId,
        /// New status.
        status: MessageStatus,
    },
    /// Start receiving a conversation's events.
    JoinConversation {
        /// Conversation to join.
        conversation_id: ConversationId,
    },
    /// Stop receiving a conversation's events.
    LeaveConversation {
        /// Conversation to leave.
        conversation_id: ConversationId,
    },
}

impl ClientFrame {
    /// Event name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Typing { .. } => "typing",
            Self::MessageStatus { .. } => "message_status",
            Self::JoinConversation { .. } => "join_conversation",
            Self::LeaveConversation { .. } => "leave_conversation",
        }
    }
}
