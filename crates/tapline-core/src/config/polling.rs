//! Polling fallback configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between two fetches of a conversation tail.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl PollingConfig {
    /// Interval between polling ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
        }
    }
}

fn default_interval() -> u64 {
    5
}
