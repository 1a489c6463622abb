//! REST API module.
//!
//! Read-only endpoints over the member store plus the websocket change feed.

mod changes;
mod members;

pub use changes::*;
pub use members::*;

use crate::errors::DirectoryError;

/// Response type for JSON handlers: the payload, or `{"error": message}`.
pub type ApiResult<T> = Result<axum::Json<T>, DirectoryError>;
