// Error handling module
// Defines the error taxonomy of the session manager

use thiserror::Error;

/// Errors that can occur while managing a session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Access token could not be decoded into claims
    #[error("Token decode failed: {0}")]
    Decode(String),

    /// Refresh endpoint answered with a non-success status
    #[error("Refresh rejected: {status} - {message}")]
    Refresh { status: u16, message: String },

    /// Refresh request never produced a response
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Refresh endpoint answered with a body we cannot use
    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    /// Durable storage backend failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for SessionError {
    fn from(err: rusqlite::Error) -> Self {
        SessionError::Storage(err.to_string())
    }
}

impl SessionError {
    /// Short machine-readable kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Decode(_) => "decode",
            SessionError::Refresh { .. } => "refresh_rejected",
            SessionError::Http(e) if e.is_timeout() => "timeout",
            SessionError::Http(e) if e.is_connect() => "connection_failed",
            SessionError::Http(_) => "http",
            SessionError::InvalidResponse(_) => "invalid_response",
            SessionError::Storage(_) => "storage",
            SessionError::Config(_) => "config",
            SessionError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
