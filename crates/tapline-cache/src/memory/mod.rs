//! In-memory last-seen store.

pub mod store;

pub use store::MemoryLastSeenStore;
