//! Transport metrics counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters shared by the transports and the supervisor.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// Realtime connection attempts started
    pub connect_attempts: AtomicU64,
    /// Realtime connections established
    pub connections_opened: AtomicU64,
    /// Frames received over the realtime link
    pub frames_received: AtomicU64,
    /// Frames written to the realtime link
    pub frames_sent: AtomicU64,
    /// Frames rejected or undecodable
    pub frames_dropped: AtomicU64,
    /// Polling ticks run
    pub polls: AtomicU64,
    /// Polling ticks whose fetch failed
    pub poll_failures: AtomicU64,
    /// Messages handed to UI listeners
    pub messages_emitted: AtomicU64,
    /// Events suppressed by the message ledger
    pub duplicates_suppressed: AtomicU64,
    /// Listener invocations that panicked
    pub listener_panics: AtomicU64,
}

impl TransportMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            messages_emitted: self.messages_emitted.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Realtime connection attempts started
    pub connect_attempts: u64,
    /// Realtime connections established
    pub connections_opened: u64,
    /// Frames received over the realtime link
    pub frames_received: u64,
    /// Frames written to the realtime link
    pub frames_sent: u64,
    /// Frames rejected or undecodable
    pub frames_dropped: u64,
    /// Polling ticks run
    pub polls: u64,
    /// Polling ticks whose fetch failed
    pub poll_failures: u64,
    /// Messages handed to UI listeners
    pub messages_emitted: u64,
    /// Events suppressed by the message ledger
    pub duplicates_suppressed: u64,
    /// Listener invocations that panicked
    pub listener_panics: u64,
}
