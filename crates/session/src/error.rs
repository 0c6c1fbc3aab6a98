//! Error types for session and credential operations

/// Errors from session storage and the refresh exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("malformed access token: {0}")]
    InvalidToken(String),

    #[error("session parse error: {0}")]
    SessionParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
