//! Prometheus metrics for the API client
//!
//! - `api_requests_total` (counter): labels `method`, `status`
//! - `api_request_duration_seconds` (histogram): label `status`
//! - `api_retries_total` (counter): label `reason`
//! - `api_token_refresh_total` (counter): label `outcome`, recorded by the
//!   refresh coordinator
//!
//! Transport failures are recorded with `status="error"`.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "api_request_duration_seconds";

/// Bucket boundaries from 5ms up to the longest configurable timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// The duration metric renders as a histogram with `_bucket` lines rather
/// than the exporter's default summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record one transport attempt. `status` is `None` when no response arrived.
pub fn record_request(method: &str, status: Option<u16>, duration_secs: f64) {
    let status_str = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    metrics::counter!("api_requests_total", "method" => method.to_string(), "status" => status_str.clone())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status_str).record(duration_secs);
}

/// Record a scheduled retry. `reason` is the status code or `network`.
pub fn record_retry(reason: &str) {
    metrics::counter!("api_retries_total", "reason" => reason.to_string()).increment(1);
}
