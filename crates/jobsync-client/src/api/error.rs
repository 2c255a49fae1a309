//! # API Errors
//!
//! Error types for portal REST calls.

use jobsync_realtime::RealtimeError;
use jobsync_types::Role;
use thiserror::Error;

/// Errors that can occur during API operations.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The portal returned an error response.
    #[error("server error: {status} - {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from the server.
        message: String,
    },

    /// No access token is available for the role.
    #[error("not signed in as {0}")]
    Unauthenticated(Role),

    /// Failed to deserialize response.
    #[error("invalid response format: {0}")]
    InvalidResponse(String),
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<ApiError> for RealtimeError {
    fn from(err: ApiError) -> Self {
        RealtimeError::backend(err)
    }
}
