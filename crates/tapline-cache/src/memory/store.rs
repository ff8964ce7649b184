//! In-memory last-seen store backed by a `DashMap`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use tapline_core::result::AppResult;
use tapline_core::traits::last_seen::LastSeenStore;
use tapline_core::types::id::{ConversationId, MessageId};

/// Process-local last-seen store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLastSeenStore {
    entries: Arc<DashMap<ConversationId, MessageId>>,
}

impl MemoryLastSeenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no conversation is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LastSeenStore for MemoryLastSeenStore {
    async fn get(&self, conversation_id: &ConversationId) -> AppResult<Option<MessageId>> {
        Ok(self
            .entries
            .get(conversation_id)
            .map(|entry| entry.value().clone()))
    }

    async fn set(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> AppResult<()> {
        self.entries
            .insert(conversation_id.clone(), message_id.clone());
        Ok(())
    }

    async fn remove(&self, conversation_id: &ConversationId) -> AppResult<()> {
        self.entries.remove(conversation_id);
        Ok(())
    }
}
