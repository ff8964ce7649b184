//! Last-seen store persisted as a single JSON object on disk.
//!
//! The whole map is rewritten on every update through a temporary file and
//! a rename, so a crash mid-write leaves the previous snapshot intact.

use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use tapline_core::error::AppError;
use tapline_core::result::AppResult;
use tapline_core::traits::last_seen::LastSeenStore;
use tapline_core::types::id::{ConversationId, MessageId};

/// JSON-file last-seen store.
#[derive(Debug)]
pub struct FileLastSeenStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileLastSeenStore {
    /// Open the store at `path`, loading any existing snapshot.
    ///
    /// A missing file starts empty. A corrupt file is logged and replaced on
    /// the next write rather than failing startup.
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable last-seen file");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == IoErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(AppError::with_source(
                    tapline_core::error::ErrorKind::Storage,
                    format!("Failed to read '{}'", path.display()),
                    e,
                ));
            }
        };

        debug!(path = %path.display(), count = entries.len(), "Loaded last-seen store");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LastSeenStore for FileLastSeenStore {
    async fn get(&self, conversation_id: &ConversationId) -> AppResult<Option<MessageId>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(conversation_id.as_str())
            .map(|id| MessageId::new(id.clone())))
    }

    async fn set(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(
            conversation_id.as_str().to_string(),
            message_id.as_str().to_string(),
        );
        if previous.as_deref() == Some(message_id.as_str()) {
            return Ok(());
        }
        self.flush(&entries).await
    }

    async fn remove(&self, conversation_id: &ConversationId) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(conversation_id.as_str()).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }
}
