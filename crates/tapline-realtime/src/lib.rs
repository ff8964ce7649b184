//! # tapline-realtime
//!
//! Chat transports for the Tapline marketplace client. Provides:
//!
//! - A websocket transport with bounded, fixed-delay reconnection
//! - A polling fallback that emulates realtime events from the REST API
//! - A supervisor that fails over to polling and exposes one event API
//! - Typed transport events with per-listener fault isolation

pub mod connection;
pub mod event;
pub mod message;
pub mod metrics;
pub mod polling;
pub mod supervisor;
pub mod transport;

pub use connection::{Connector, RealtimeTransport, WsConnector};
pub use event::{EventBus, EventKind, TransportEvent};
pub use polling::{HttpMessageApi, PollingTransport};
pub use supervisor::{ConnectionStatus, TransportSupervisor};
