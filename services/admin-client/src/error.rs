//! Service-specific error types

use recovery::ClassifiedError;
use thiserror::Error;

/// Errors surfaced by the command-line front end.
///
/// API failures arrive already classified; their side effects (logging,
/// notices, reporting) have run by the time they reach this type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0.user_message)]
    Api(#[from] ClassifiedError),

    #[error("failed to read {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("session error: {0}")]
    Session(#[from] session::Error),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
