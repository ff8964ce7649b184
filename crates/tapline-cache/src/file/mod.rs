//! File-backed last-seen store.

pub mod store;

pub use store::FileLastSeenStore;
