//! # tapline-cache
//!
//! Last-seen message id stores for the polling transport. Supports two modes:
//!
//! - **memory**: process-local map, forgotten on restart
//! - **file**: JSON file on disk, so a restart does not re-announce old
//!   messages as new
//!
//! The provider is selected at runtime based on configuration.

#[cfg(feature = "file")]
pub mod file;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;

pub use provider::LastSeenStoreManager;
