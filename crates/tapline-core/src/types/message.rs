//! Chat message model shared by every transport.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::id::{ConversationId, MessageId, UserId};

/// Which side of a two-party negotiation sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    /// A broker bidding on a tree lot.
    Broker,
    /// The farmer who owns the lot.
    Farmer,
}

impl SenderRole {
    /// String representation as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Farmer => "farmer",
        }
    }
}

impl FromStr for SenderRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broker" => Ok(Self::Broker),
            "farmer" => Ok(Self::Farmer),
            other => Err(AppError::validation(format!("unknown sender role '{other}'"))),
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery lifecycle of a message.
///
/// Normal progress is `Sending → Sent → Delivered → Read`; any step may be
/// skipped but never undone. `Failed` is terminal and only reachable from
/// `Sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Handed to a transport, not yet persisted by the backend.
    Sending,
    /// Persisted by the backend.
    Sent,
    /// Received by the other party's client.
    Delivered,
    /// Seen by the other party.
    Read,
    /// The backend never accepted the message.
    Failed,
}

impl MessageStatus {
    /// String representation as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    fn rank(&self) -> Option<u8> {
        match self {
            Self::Sending => Some(0),
            Self::Sent => Some(1),
            Self::Delivered => Some(2),
            Self::Read => Some(3),
            Self::Failed => None,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(current), Some(target)) => target > current,
            (Some(0), None) => true,
            _ => false,
        }
    }

    /// Apply `next` if the lifecycle allows it. Returns whether it changed.
    pub fn advance(&mut self, next: MessageStatus) -> bool {
        if self.can_advance_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }
}

impl FromStr for MessageStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sending" | "pending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" | "seen" => Ok(Self::Read),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::validation(format!(
                "unknown message status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat message in the shape every transport emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Backend id (or a provisional client id).
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Author's side of the negotiation.
    pub sender_role: SenderRole,
    /// Text payload.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Delivery lifecycle state.
    pub status: MessageStatus,
    /// Message this one replies to. May reference a deleted message.
    pub reply_to: Option<MessageId>,
}

/// A message as the backend serializes it, over REST and over the socket.
///
/// Only `id` is required to decode; the remaining fields are checked by
/// [`MessageRecord::into_message`] so one incomplete record cannot spoil a
/// whole page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireRecord")]
pub struct MessageRecord {
    /// Backend id.
    pub id: String,
    /// Owning conversation. Omitted by conversation-scoped endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Author id.
    pub sender_id: String,
    /// Author role.
    pub sender_role: String,
    /// Text payload.
    pub content: String,
    /// Creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Delivery status. Persisted records without one count as sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Replied-to message id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Decoding shape. Document stores may send `_id`, `id` or both.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default, alias = "conversation_id")]
    conversation_id: Option<String>,
    #[serde(default, alias = "sender_id")]
    sender_id: Option<String>,
    #[serde(default, alias = "sender_role")]
    sender_role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "created_at", alias = "timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "reply_to")]
    reply_to: Option<String>,
}

impl From<WireRecord> for MessageRecord {
    fn from(wire: WireRecord) -> Self {
        let id = wire
            .id
            .filter(|id| !id.trim().is_empty())
            .or(wire.object_id)
            .unwrap_or_default();
        Self {
            id,
            conversation_id: wire.conversation_id,
            sender_id: wire.sender_id.unwrap_or_default(),
            sender_role: wire.sender_role.unwrap_or_default(),
            content: wire.content.unwrap_or_default(),
            created_at: wire.created_at,
            status: wire.status,
            reply_to: wire.reply_to,
        }
    }
}

impl MessageRecord {
    /// A record of which only the id could be read.
    pub fn unreadable(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Best-effort id of a raw record that failed to decode.
    pub fn raw_id(value: &serde_json::Value) -> Option<&str> {
        ["id", "_id"]
            .iter()
            .filter_map(|key| value.get(key).and_then(|v| v.as_str()))
            .find(|id| !id.trim().is_empty())
    }

    /// Normalize into a [`Message`].
    ///
    /// `conversation_id` is used when the record does not carry its own.
    pub fn into_message(self, conversation_id: &ConversationId) -> Result<Message, AppError> {
        if self.id.trim().is_empty() {
            return Err(AppError::validation("message record without id"));
        }
        if self.sender_id.trim().is_empty() {
            return Err(AppError::validation(format!(
                "message record '{}' without senderId",
                self.id
            )));
        }
        let timestamp = self.created_at.ok_or_else(|| {
            AppError::validation(format!("message record '{}' without createdAt", self.id))
        })?;

        let sender_role: SenderRole = self.sender_role.parse()?;
        let status = match self.status.as_deref() {
            Some(raw) => raw.parse()?,
            None => MessageStatus::Sent,
        };

        Ok(Message {
            id: MessageId::new(self.id),
            conversation_id: self
                .conversation_id
                .map(ConversationId::new)
                .unwrap_or_else(|| conversation_id.clone()),
            sender_id: UserId::new(self.sender_id),
            sender_role,
            content: self.content,
            timestamp,
            status,
            reply_to: self.reply_to.filter(|r| !r.is_empty()).map(MessageId::new),
        })
    }
}

/// Body of the send-message request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Text payload.
    pub content: String,
    /// Replied-to message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}
