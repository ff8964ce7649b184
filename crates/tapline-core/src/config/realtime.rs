//! Realtime websocket transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Realtime (websocket) transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Websocket endpoint of the messaging backend.
    #[serde(default = "default_url")]
    pub url: String,
    /// Connection attempts before giving up until a manual retry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Timeout for a single connection attempt in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Largest inbound frame accepted, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl RealtimeConfig {
    /// Delay between two connection attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Timeout for one connection attempt.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            connect_timeout_seconds: default_connect_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:5000/realtime".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_frame_bytes() -> usize {
    65_536
}
