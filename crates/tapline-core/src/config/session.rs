//! Session credential configuration.

use serde::{Deserialize, Serialize};

/// The signed-in user's credential and the conversations to open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bearer token issued by the backend. Read once at startup.
    #[serde(default)]
    pub token: Option<String>,
    /// Conversation ids opened when the client starts.
    #[serde(default)]
    pub conversations: Vec<String>,
}
