//! Typed transport events and the bus that fans them out.

pub mod bus;
pub mod types;

pub use bus::{EventBus, Listener, ListenerId};
pub use types::{ConversationSummary, EventKind, StatusEvent, TransportEvent, TypingEvent};
