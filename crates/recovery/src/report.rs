//! Classification plus side effects, governed by caller options

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::classify::{ClassifiedError, Failure, Severity, classify};
use crate::notify::{ErrorSink, Notice, Notifier};

/// Which side effects to apply when handling an error.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub log: bool,
    pub notify: bool,
    /// Forward to the external sink (only High and Critical are forwarded)
    pub report: bool,
    /// Replaces the table/server user message
    pub custom_message: Option<String>,
    pub context: BTreeMap<String, String>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            log: true,
            notify: true,
            report: true,
            custom_message: None,
            context: BTreeMap::new(),
        }
    }
}

impl ReportOptions {
    /// Classify only, no side effects.
    pub fn silent() -> Self {
        Self {
            log: false,
            notify: false,
            report: false,
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.custom_message = Some(message.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// How long an error notice stays up.
pub fn notification_duration(severity: Severity) -> Duration {
    match severity {
        Severity::Low => Duration::from_secs(3),
        Severity::Medium => Duration::from_secs(4),
        Severity::High => Duration::from_secs(5),
        Severity::Critical => Duration::from_secs(6),
    }
}

/// Classifies failures and applies logging, notification and reporting.
pub struct ErrorReporter {
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn ErrorSink>,
}

impl ErrorReporter {
    pub fn new(notifier: Arc<dyn Notifier>, sink: Arc<dyn ErrorSink>) -> Self {
        Self { notifier, sink }
    }

    /// Classify `failure`, apply `options`, and return the finished error.
    pub fn handle(&self, failure: &Failure, options: &ReportOptions) -> ClassifiedError {
        let mut error = classify(failure);
        if let Some(message) = &options.custom_message {
            error.user_message = message.clone();
        }
        error
            .context
            .extend(options.context.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.emit(&error, options);
        error
    }

    /// Apply side effects for an already classified error.
    pub fn emit(&self, error: &ClassifiedError, options: &ReportOptions) {
        if options.log {
            log_classified(error);
        }
        if options.notify {
            self.notifier.notify(Notice::error(
                error.user_message.clone(),
                notification_duration(error.severity),
            ));
        }
        if options.report && error.severity >= Severity::High {
            self.sink.report(error);
        }
    }
}

fn log_classified(err: &ClassifiedError) {
    match err.severity {
        Severity::Critical | Severity::High => error!(
            code = %err.code,
            severity = %err.severity,
            http_status = ?err.http_status,
            context = ?err.context,
            "{}",
            err.technical_message
        ),
        Severity::Medium => warn!(
            code = %err.code,
            http_status = ?err.http_status,
            context = ?err.context,
            "{}",
            err.technical_message
        ),
        Severity::Low => info!(
            code = %err.code,
            http_status = ?err.http_status,
            "{}",
            err.technical_message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorCode;
    use crate::notify::{NoticeLevel, Recorder};

    fn reporter() -> (ErrorReporter, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::new());
        (ErrorReporter::new(recorder.clone(), recorder.clone()), recorder)
    }

    fn status(status: u16) -> Failure {
        Failure::Status {
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn critical_errors_are_notified_and_reported() {
        let (reporter, recorder) = reporter();
        let err = reporter.handle(&status(503), &ReportOptions::default());
        assert_eq!(err.code, ErrorCode::ServerError);

        let notices = recorder.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].duration, Duration::from_secs(6));
        assert_eq!(recorder.reports().len(), 1);
    }

    #[test]
    fn low_severity_is_not_reported() {
        let (reporter, recorder) = reporter();
        reporter.handle(&status(404), &ReportOptions::default());
        assert_eq!(recorder.notices()[0].duration, Duration::from_secs(3));
        assert!(recorder.reports().is_empty());
    }

    #[test]
    fn silent_has_no_side_effects() {
        let (reporter, recorder) = reporter();
        let err = reporter.handle(&status(500), &ReportOptions::silent());
        assert_eq!(err.code, ErrorCode::ServerError);
        assert!(recorder.notices().is_empty());
        assert!(recorder.reports().is_empty());
    }

    #[test]
    fn report_flag_off_skips_sink() {
        let (reporter, recorder) = reporter();
        let options = ReportOptions {
            report: false,
            ..ReportOptions::default()
        };
        reporter.handle(&status(403), &options);
        assert_eq!(recorder.notices().len(), 1);
        assert!(recorder.reports().is_empty());
    }

    #[test]
    fn custom_message_and_context_are_applied() {
        let (reporter, recorder) = reporter();
        let options = ReportOptions::default()
            .with_message("Could not save the contact")
            .with_context("request_id", "abc");
        let err = reporter.handle(&status(400), &options);
        assert_eq!(err.user_message, "Could not save the contact");
        assert_eq!(err.context.get("request_id").map(String::as_str), Some("abc"));
        assert_eq!(recorder.notices()[0].message, "Could not save the contact");
    }

    #[test]
    fn durations_scale_with_severity() {
        assert!(notification_duration(Severity::Low) < notification_duration(Severity::Medium));
        assert!(notification_duration(Severity::Medium) < notification_duration(Severity::High));
        assert!(notification_duration(Severity::High) < notification_duration(Severity::Critical));
    }
}
