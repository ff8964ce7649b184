//! Realtime frame types, serialization, and validation.

pub mod frames;
pub mod serializer;
pub mod validator;

pub use frames::{ClientFrame, ServerFrame};
