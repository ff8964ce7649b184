//! Request/response collaborator for the messaging backend.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::id::{ConversationId, MessageId};
use crate::types::message::{MessageRecord, SendMessageRequest};

/// REST side of the messaging backend.
#[async_trait]
pub trait MessageApi: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch a conversation's messages, oldest first.
    async fn fetch_messages(&self, conversation_id: &ConversationId)
    -> AppResult<Vec<MessageRecord>>;

    /// Persist a new message and return the backend's record of it.
    async fn send_message(&self, request: &SendMessageRequest) -> AppResult<MessageRecord>;

    /// Mark a batch of messages as read.
    async fn mark_read(&self, message_ids: &[MessageId]) -> AppResult<()>;
}
