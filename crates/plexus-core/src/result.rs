//! Convenience result type alias for Plexus.

use crate::error::AppError;

/// A specialized `Result` type for Plexus operations at the application
/// boundary.
pub type AppResult<T> = Result<T, AppError>;
