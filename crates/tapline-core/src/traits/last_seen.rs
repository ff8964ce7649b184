//! Persistence of the newest message id already announced per conversation.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::id::{ConversationId, MessageId};

/// Trait for last-seen id backends (in-memory or file-backed).
///
/// Keys are independent per conversation, so concurrent pollers of
/// different conversations never contend on the same entry.
#[async_trait]
pub trait LastSeenStore: Send + Sync + std::fmt::Debug + 'static {
    /// The last announced message id, if any.
    async fn get(&self, conversation_id: &ConversationId) -> AppResult<Option<MessageId>>;

    /// Record `message_id` as the last announced message.
    async fn set(&self, conversation_id: &ConversationId, message_id: &MessageId)
    -> AppResult<()>;

    /// Forget the conversation.
    async fn remove(&self, conversation_id: &ConversationId) -> AppResult<()>;
}
