//! Error handling module for the member directory.
//!
//! One error type covers the client core (fetch, change feed, selection) and the
//! read endpoint, with a mapping to HTTP status codes for the latter.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    pub const SUBSCRIPTION_UNAVAILABLE: &str = "SUBSCRIPTION_UNAVAILABLE";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Directory error type.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// No response was received from the read endpoint.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// The read endpoint answered with a non-success status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
    /// The change feed could not be established.
    #[error("change feed unavailable: {0}")]
    SubscriptionUnavailable(String),
    /// A selected member is no longer part of the snapshot.
    #[error("member {0} not found")]
    NotFound(String),
    /// Database error
    #[error("database error: {0}")]
    Database(String),
    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),
    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl DirectoryError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DirectoryError::NotFound(_) => StatusCode::NOT_FOUND,
            DirectoryError::Transport(_) | DirectoryError::Server { .. } => {
                StatusCode::BAD_GATEWAY
            }
            DirectoryError::SubscriptionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DirectoryError::Decode(_)
            | DirectoryError::Database(_)
            | DirectoryError::Config(_)
            | DirectoryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::Transport(_) => codes::TRANSPORT_ERROR,
            DirectoryError::Server { .. } => codes::SERVER_ERROR,
            DirectoryError::Decode(_) => codes::DECODE_ERROR,
            DirectoryError::SubscriptionUnavailable(_) => codes::SUBSCRIPTION_UNAVAILABLE,
            DirectoryError::NotFound(_) => codes::NOT_FOUND,
            DirectoryError::Database(_) => codes::DATABASE_ERROR,
            DirectoryError::Config(_) => codes::CONFIG_ERROR,
            DirectoryError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            DirectoryError::Transport(err) => err.to_string(),
            DirectoryError::Server { message, .. } => message.clone(),
            DirectoryError::NotFound(id) => format!("Member {} not found", id),
            DirectoryError::Decode(msg)
            | DirectoryError::SubscriptionUnavailable(msg)
            | DirectoryError::Database(msg)
            | DirectoryError::Config(msg)
            | DirectoryError::Internal(msg) => msg.clone(),
        }
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        DirectoryError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        tracing::debug!("JSON error: {:?}", err);
        DirectoryError::Decode(format!("JSON error: {}", err))
    }
}

/// Error body served by the read endpoint and understood by the gateway.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display_carries_message() {
        let err = DirectoryError::Server {
            status: 500,
            message: "relation \"members\" does not exist".to_string(),
        };
        assert_eq!(err.error_code(), codes::SERVER_ERROR);
        assert_eq!(err.message(), "relation \"members\" does not exist");
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_database_error_maps_to_500() {
        let err = DirectoryError::Database("disk I/O error".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_message() {
        let err = DirectoryError::NotFound("m1".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Member m1 not found");
    }
}
