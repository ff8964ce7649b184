//! # tapline-core
//!
//! Core crate for the Tapline messaging client. Contains the chat domain
//! types, configuration schemas, the collaborator traits the transports
//! depend on, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Tapline crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
