//! Shared domain types.

pub mod id;
pub mod message;

pub use id::{ConversationId, MessageId, UserId};
pub use message::{Message, MessageRecord, MessageStatus, SendMessageRequest, SenderRole};
