//! HTTP-facing error types for the DougChat server.
//!
//! Handlers return [`ApiError`] and let its [`IntoResponse`] impl pick the
//! status code and JSON body. Store failures are deliberately generic: the
//! underlying cause is logged where it happens and never sent to clients.
//! Auth provider rejections are the exception and are passed through verbatim.
//!
//! # Example
//!
//! ```rust
//! use axum::http::StatusCode;
//! use dougchat_server::error::ApiError;
//!
//! let err = ApiError::EmptyMessage;
//! assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
//! assert_eq!(err.to_string(), "Message cannot be empty");
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;

/// Errors returned to HTTP clients.
///
/// The `Display` text of each variant is exactly the `error` string sent in
/// the response body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Reading messages from the store failed.
    #[error("Error fetching messages")]
    FetchMessages,

    /// Inserting a message failed, or the request body was unusable.
    #[error("Error creating message")]
    CreateMessage,

    /// The message text is empty after trimming.
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// The request carries no valid session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The auth provider refused the credentials; the message is its own.
    #[error("{0}")]
    AuthRejected(String),

    /// The auth provider could not be reached.
    #[error("Authentication service unavailable")]
    AuthUnavailable,

    /// Unexpected server-side failure, such as a template error.
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::FetchMessages | Self::CreateMessage | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::EmptyMessage | Self::AuthRejected(_) => StatusCode::BAD_REQUEST,
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::AuthUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected(message) => Self::AuthRejected(message),
            AuthError::Unauthorized => Self::NotAuthenticated,
            AuthError::Unavailable(_) => Self::AuthUnavailable,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
