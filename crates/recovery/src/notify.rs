//! Outbound side effects: user notices, error reports and redirects
//!
//! The pipeline never talks to a UI directly. It emits `Notice`s to a
//! `Notifier`, forwards serious errors to an `ErrorSink`, and asks a
//! `Navigator` to send the user to the login route when the session is gone.
//! The tracing-backed implementations are what the CLI uses; `Recorder`
//! keeps everything in memory for embedding and tests.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::classify::ClassifiedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient message for the user, shown for `duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub duration: Duration,
}

impl Notice {
    pub fn warning(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
            duration,
        }
    }

    pub fn error(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            duration,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// External error-reporting destination for High and Critical errors.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &ClassifiedError);
}

pub trait Navigator: Send + Sync {
    fn redirect(&self, route: &str);
}

/// Renders notices as log events.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        let duration_ms = notice.duration.as_millis() as u64;
        match notice.level {
            NoticeLevel::Info => info!(target: "notice", duration_ms, "{}", notice.message),
            NoticeLevel::Warning => warn!(target: "notice", duration_ms, "{}", notice.message),
            NoticeLevel::Error => error!(target: "notice", duration_ms, "{}", notice.message),
        }
    }
}

/// Reports errors as structured log events under the `error_report` target.
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, err: &ClassifiedError) {
        error!(
            target: "error_report",
            code = %err.code,
            severity = %err.severity,
            http_status = ?err.http_status,
            context = ?err.context,
            timestamp = err.timestamp,
            "{}",
            err.technical_message
        );
    }
}

/// Logs the redirect; a terminal has no router to drive.
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn redirect(&self, route: &str) {
        warn!(route, "session ended, log in again to continue");
    }
}

/// In-memory notifier, sink and navigator.
#[derive(Default)]
pub struct Recorder {
    notices: Mutex<Vec<Notice>>,
    reports: Mutex<Vec<ClassifiedError>>,
    redirects: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<ClassifiedError> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Notifier for Recorder {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

impl ErrorSink for Recorder {
    fn report(&self, error: &ClassifiedError) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(error.clone());
        }
    }
}

impl Navigator for Recorder {
    fn redirect(&self, route: &str) {
        if let Ok(mut redirects) = self.redirects.lock() {
            redirects.push(route.to_string());
        }
    }
}
