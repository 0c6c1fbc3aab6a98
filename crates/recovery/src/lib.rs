//! Response-side recovery for the shop admin API pipeline
//!
//! Everything that happens after a request fails: classifying the failure,
//! deciding whether to retry it, recovering from an expired access token, and
//! telling the user and the error-reporting sink about what could not be
//! recovered.
//!
//! Failure handling order:
//! 1. HTTP 401 on a request not yet replayed → `RefreshCoordinator::recover()`
//!    (one refresh per burst; everyone else queues behind it)
//! 2. Retryable failure within budget → `RetryState::on_failure()` yields a
//!    backoff delay, then the request is resubmitted
//! 3. Anything else → `ErrorReporter::handle()` classifies, logs, notifies and
//!    reports per `ReportOptions`, and the `ClassifiedError` goes to the caller

pub mod classify;
pub mod error;
pub mod notify;
pub mod refresh;
pub mod report;
pub mod retry;

pub use classify::{ClassifiedError, ErrorCode, Failure, Severity, classify};
pub use error::{Error, Result};
pub use notify::{
    ErrorSink, Navigator, Notice, NoticeLevel, Notifier, Recorder, TracingNavigator,
    TracingNotifier, TracingSink,
};
pub use refresh::{RefreshCoordinator, RefreshPhase, TokenExchange};
pub use report::{ErrorReporter, ReportOptions, notification_duration};
pub use retry::{RetryAction, RetryPolicy, RetryState, parse_retry_after};
