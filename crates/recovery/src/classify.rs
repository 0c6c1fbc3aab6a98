//! Error classification for API failures
//!
//! Turns any failure the pipeline can observe (an HTTP error status, a
//! transport failure, a client-side fault) into a `ClassifiedError` with a
//! stable code, a severity and a message that is safe to show the user.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Longest response-body excerpt kept in `technical_message`.
const MAX_BODY_EXCERPT: usize = 512;

/// A failed attempt, as seen by the recovery chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The server answered with a non-2xx status
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
    /// No response arrived (connect failure, reset, timeout)
    Network { timeout: bool, message: String },
    /// The client could not build or send the request at all
    Internal(String),
    /// Anything else
    Other(String),
}

impl Failure {
    pub fn status(&self) -> Option<u16> {
        match self {
            Failure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Failure::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Stable error codes surfaced to callers and reporting sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Auth
    Unauthorized,
    Forbidden,
    SessionExpired,
    // Network
    ConnectionError,
    Timeout,
    // API
    BadRequest,
    NotFound,
    ServerError,
    RateLimited,
    // Client-side
    Validation,
    FileError,
    WebSocket,
    PaymentFailed,
    Internal,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::FileError => "FILE_ERROR",
            ErrorCode::WebSocket => "WEB_SOCKET",
            ErrorCode::PaymentFailed => "PAYMENT_FAILED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// Default severity for this code.
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::ServerError | ErrorCode::Internal => Severity::Critical,
            ErrorCode::Unauthorized
            | ErrorCode::Forbidden
            | ErrorCode::PaymentFailed
            | ErrorCode::ConnectionError => Severity::High,
            ErrorCode::BadRequest | ErrorCode::NotFound => Severity::Low,
            _ => Severity::Medium,
        }
    }

    /// Message shown to the user when the caller supplies none.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "You need to log in to continue.",
            ErrorCode::Forbidden => "You do not have permission to perform this action.",
            ErrorCode::SessionExpired => "Your session has expired. Please log in again.",
            ErrorCode::ConnectionError => {
                "Unable to reach the server. Check your connection and try again."
            }
            ErrorCode::Timeout => "The server took too long to respond. Please try again.",
            ErrorCode::BadRequest => "The request could not be processed. Please review the data.",
            ErrorCode::NotFound => "The requested resource was not found.",
            ErrorCode::ServerError => "Something went wrong on our side. Please try again later.",
            ErrorCode::RateLimited => "Too many requests. Please wait a moment and try again.",
            ErrorCode::Validation => "Some fields are invalid. Please review them and try again.",
            ErrorCode::FileError => "The file could not be processed.",
            ErrorCode::WebSocket => "Live updates are temporarily unavailable.",
            ErrorCode::PaymentFailed => "The payment could not be completed.",
            ErrorCode::Internal => "An unexpected error occurred.",
            ErrorCode::Unknown => "An unexpected error occurred. Please try again.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized failure record. Built once, then only read.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{code}: {technical_message}")]
pub struct ClassifiedError {
    pub code: ErrorCode,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub user_message: String,
    pub technical_message: String,
    pub context: BTreeMap<String, String>,
    /// Unix milliseconds
    pub timestamp: u64,
}

impl ClassifiedError {
    /// Error with the code's default severity and user message.
    pub fn new(code: ErrorCode, technical_message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            http_status: None,
            user_message: code.user_message().to_string(),
            technical_message: technical_message.into(),
            context: BTreeMap::new(),
            timestamp: session::now_millis(),
        }
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error code for an HTTP status.
pub fn code_for_status(status: u16) -> ErrorCode {
    match status {
        400 => ErrorCode::BadRequest,
        401 => ErrorCode::Unauthorized,
        403 => ErrorCode::Forbidden,
        404 => ErrorCode::NotFound,
        429 => ErrorCode::RateLimited,
        500..=599 => ErrorCode::ServerError,
        402..=499 => ErrorCode::BadRequest,
        _ => ErrorCode::Unknown,
    }
}

/// Classify a failure. Pure apart from reading the clock for `timestamp`.
///
/// For 4xx responses the server's own message (`message`, `detail`, `error`
/// or `error.message` in a JSON body) becomes the user message. 5xx bodies
/// only ever reach `technical_message`.
pub fn classify(failure: &Failure) -> ClassifiedError {
    match failure {
        Failure::Status { status, body, .. } => {
            let code = code_for_status(*status);
            let technical = if body.is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", excerpt(body))
            };
            let mut error = ClassifiedError::new(code, technical);
            error.http_status = Some(*status);
            if (400..500).contains(status) {
                if let Some(message) = server_message(body) {
                    error.user_message = message;
                }
            }
            error
        }
        Failure::Network { timeout: true, message } => {
            ClassifiedError::new(ErrorCode::Timeout, message.clone())
        }
        Failure::Network { message, .. } => {
            ClassifiedError::new(ErrorCode::ConnectionError, message.clone())
        }
        Failure::Internal(message) => ClassifiedError::new(ErrorCode::Internal, message.clone()),
        Failure::Other(message) => ClassifiedError::new(ErrorCode::Unknown, message.clone()),
    }
}

fn server_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        json.get("message"),
        json.get("detail"),
        json.get("error").filter(|v| v.is_string()),
        json.get("error").and_then(|e| e.get("message")),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn excerpt(body: &str) -> &str {
    if body.len() <= MAX_BODY_EXCERPT {
        return body;
    }
    let mut end = MAX_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
