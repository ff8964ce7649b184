//! Store manager that dispatches to the configured last-seen provider.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use tapline_core::config::StoreConfig;
use tapline_core::error::AppError;
use tapline_core::result::AppResult;
use tapline_core::traits::last_seen::LastSeenStore;
use tapline_core::types::id::{ConversationId, MessageId};

/// Wraps the last-seen provider selected by configuration.
#[derive(Debug, Clone)]
pub struct LastSeenStoreManager {
    inner: Arc<dyn LastSeenStore>,
}

impl LastSeenStoreManager {
    /// Create a store manager from configuration.
    pub async fn new(config: &StoreConfig) -> AppResult<Self> {
        let inner: Arc<dyn LastSeenStore> = match config.provider.as_str() {
            #[cfg(feature = "file")]
            "file" => {
                info!(path = %config.path, "Initializing file last-seen store");
                Arc::new(crate::file::FileLastSeenStore::open(&config.path).await?)
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory last-seen store");
                Arc::new(crate::memory::MemoryLastSeenStore::new())
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown last-seen store provider: '{other}'. Supported: memory, file"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a manager from an existing provider (for testing).
    pub fn from_provider(provider: Arc<dyn LastSeenStore>) -> Self {
        Self { inner: provider }
    }

    /// Shared handle to the provider, as the polling transport expects it.
    pub fn shared(&self) -> Arc<dyn LastSeenStore> {
        Arc::clone(&self.inner)
    }
}

#[async_trait]
impl LastSeenStore for LastSeenStoreManager {
    async fn get(&self, conversation_id: &ConversationId) -> AppResult<Option<MessageId>> {
        self.inner.get(conversation_id).await
    }

    async fn set(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> AppResult<()> {
        self.inner.set(conversation_id, message_id).await
    }

    async fn remove(&self, conversation_id: &ConversationId) -> AppResult<()> {
        self.inner.remove(conversation_id).await
    }
}
