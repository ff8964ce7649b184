//! Socket seam between the realtime transport and the network.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why opening a realtime link failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The environment cannot speak the realtime protocol at all.
    #[error("realtime transport not supported: {0}")]
    Unsupported(String),
    /// The backend refused the credential.
    #[error("credential rejected: {0}")]
    Rejected(String),
    /// Network or handshake failure.
    #[error("network error: {0}")]
    Network(String),
    /// The attempt did not complete in time.
    #[error("connection attempt timed out")]
    Timeout,
}

/// Something the link observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame from the server.
    Frame(String),
    /// The link closed.
    Closed {
        /// Close reason or error text.
        reason: String,
    },
}

/// An open full-duplex text link.
///
/// Dropping `outbound` closes the link.
#[derive(Debug)]
pub struct RealtimeLink {
    /// Frames to send to the server.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames and close notifications from the server.
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens authenticated realtime links.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug + 'static {
    /// Open a link authenticated with the bearer `token`.
    async fn open(&self, token: &str) -> Result<RealtimeLink, ConnectError>;
}
