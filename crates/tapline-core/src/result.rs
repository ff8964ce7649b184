//! Convenience result type alias for Tapline.

use crate::error::AppError;

/// A specialized `Result` type for Tapline operations.
pub type AppResult<T> = Result<T, AppError>;
