//! Last-seen store configuration.

use serde::{Deserialize, Serialize};

/// Where the polling transport persists last-seen message ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store provider: `"memory"` or `"file"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Path of the JSON file used by the `file` provider.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            path: default_path(),
        }
    }
}

fn default_provider() -> String {
    "file".to_string()
}

fn default_path() -> String {
    "data/last_seen.json".to_string()
}
