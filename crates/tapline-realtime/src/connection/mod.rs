//! Realtime (websocket) transport.
//!
//! - `connector` — the socket seam ([`Connector`], [`RealtimeLink`])
//! - `ws` — the `tokio-tungstenite` connector
//! - `retry` — bounded reconnection policy
//! - `transport` — the [`RealtimeTransport`] state machine

pub mod connector;
pub mod retry;
pub mod transport;
pub mod ws;

pub use connector::{ConnectError, Connector, LinkEvent, RealtimeLink};
pub use retry::RetryPolicy;
pub use transport::{LinkState, RealtimeTransport};
pub use ws::WsConnector;
