//! Collaborator traits the transports are written against.

pub mod last_seen;
pub mod message_api;

pub use last_seen::LastSeenStore;
pub use message_api::MessageApi;
