//! Transport supervisor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the component that picks the authoritative transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds to wait for the realtime transport before failing over.
    #[serde(default = "default_watchdog")]
    pub watchdog_seconds: u64,
    /// Whether to drop already-delivered message ids as a safety net.
    #[serde(default = "default_true")]
    pub dedup_enabled: bool,
    /// Number of recent message ids remembered by the safety net.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: u64,
}

impl SupervisorConfig {
    /// Watchdog window for the first realtime connection.
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_seconds)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            watchdog_seconds: default_watchdog(),
            dedup_enabled: true,
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

fn default_watchdog() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_dedup_capacity() -> u64 {
    1024
}
