//! Supervisor connection state.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which transport, if any, is currently delivering updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not started, stopped, or waiting on the realtime retry budget.
    Disconnected,
    /// A realtime attempt is in flight.
    Connecting,
    /// Realtime is up.
    Connected,
    /// Realtime gave up and polling is active.
    Failed,
}

impl ConnectionStatus {
    /// Text shown to the user for this status.
    pub fn describe(&self, poll_interval: Duration) -> String {
        match self {
            Self::Connected => "real-time active".to_string(),
            Self::Failed => format!(
                "checking for updates every {} seconds",
                poll_interval.as_secs()
            ),
            Self::Connecting => "connecting…".to_string(),
            Self::Disconnected => "offline".to_string(),
        }
    }

    /// Whether `retry()` is allowed from this status.
    pub fn can_retry(&self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
