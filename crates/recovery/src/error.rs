//! Error types for recovery configuration

/// Errors from building recovery components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

/// Result alias for recovery operations.
pub type Result<T> = std::result::Result<T, Error>;
