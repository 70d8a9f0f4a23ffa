//! Error types for cf-list-sync
//!
//! This module defines the error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Errors raised by HTTP transports and the Cloudflare API
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Rate limited; carries the parsed Retry-After seconds if present
    #[error("Rate limited by upstream")]
    RateLimited(Option<u64>),

    /// Server error
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// API envelope reported success: false
    #[error("API error: {0}")]
    Api(String),

    /// Invalid or malformed data received
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Resource not found
    #[error("Resource not found")]
    NotFound,

    /// Unauthorized
    #[error("Unauthorized")]
    Unauthorized,

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if retrying the operation may succeed
    fn is_retryable(&self) -> bool;
}

impl RetryableError for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            SyncError::NetworkTimeout => true,
            SyncError::ConnectionRefused => true,
            SyncError::RateLimited(_) => true,
            SyncError::ServerError(code) if *code >= 500 => true,
            SyncError::Network(_) => true,

            // Malformed feeds and 4xx responses do not heal on retry
            SyncError::Api(_) => false,
            SyncError::InvalidData(_) => false,
            SyncError::NotFound => false,
            SyncError::Unauthorized => false,
            SyncError::ServerError(_) => false,
        }
    }
}

impl SyncError {
    /// Classify a reqwest transport error
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::NetworkTimeout
        } else if err.is_connect() {
            SyncError::ConnectionRefused
        } else {
            SyncError::Network(err.to_string())
        }
    }
}
