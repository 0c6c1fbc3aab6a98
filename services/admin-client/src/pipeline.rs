//! Request pipeline over reqwest
//!
//! Each logical request is copied, run through the request stages, and sent.
//! Failures go through the recovery chain in a fixed order:
//!
//! 1. 401 on a request that may refresh and has not yet been replayed:
//!    join the single-flight refresh, then replay once with the new token
//! 2. Retryable failure within budget: back off, then resubmit
//! 3. Anything else: classify, report per options, return `Err`
//!
//! A request that is already the post-refresh replay is never retried again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use recovery::{
    ClassifiedError, ErrorReporter, ErrorSink, Failure, Navigator, Notice, Notifier,
    RefreshCoordinator, ReportOptions, RetryAction, RetryPolicy, RetryState, TracingNavigator,
    TracingNotifier, TracingSink, parse_retry_after,
};
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use session::{RefreshClient, SessionStore};
use stages::{
    ApiRequest, AuthHeaderInjector, BodySanitizer, CsrfInjector, HeaderInjection,
    MultipartField, MultipartValue, RequestBody, RequestStage, StaticHeaders,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::metrics;

/// Where notices, error reports and redirects go.
#[derive(Clone)]
pub struct Hooks {
    pub notifier: Arc<dyn Notifier>,
    pub sink: Arc<dyn ErrorSink>,
    pub navigator: Arc<dyn Navigator>,
}

impl Hooks {
    /// Render everything through tracing.
    pub fn tracing() -> Self {
        Self {
            notifier: Arc::new(TracingNotifier),
            sink: Arc::new(TracingSink),
            navigator: Arc::new(TracingNavigator),
        }
    }

    /// Capture everything in a `Recorder`.
    #[cfg(test)]
    pub fn recorder(recorder: Arc<recovery::Recorder>) -> Self {
        Self {
            notifier: recorder.clone(),
            sink: recorder.clone(),
            navigator: recorder,
        }
    }
}

/// A successful (2xx) response, fully buffered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    stages: Vec<Arc<dyn RequestStage>>,
    session: Arc<SessionStore>,
    policy: RetryPolicy,
    coordinator: Arc<RefreshCoordinator>,
    reporter: Arc<ErrorReporter>,
    notifier: Arc<dyn Notifier>,
}

/// Shop admin API client. Cheap to clone; clones share the session, cookie
/// jar and refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(
        api: &ApiConfig,
        policy: RetryPolicy,
        extra_headers: &[HeaderInjection],
        session: Arc<SessionStore>,
        hooks: Hooks,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        let timeout = api.timeout();

        let reporter = Arc::new(ErrorReporter::new(hooks.notifier.clone(), hooks.sink));
        let exchange = Arc::new(RefreshClient::new(
            http.clone(),
            api.url(&api.refresh_path),
            timeout,
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            exchange,
            session.clone(),
            reporter.clone(),
            hooks.navigator,
            api.login_route.clone(),
        ));

        let stages: Vec<Arc<dyn RequestStage>> = vec![
            Arc::new(StaticHeaders::new(&api.client_version, extra_headers)),
            Arc::new(AuthHeaderInjector::new(session.clone())),
            Arc::new(CsrfInjector::new(session.clone())),
            Arc::new(BodySanitizer),
        ];

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: api.base_url.trim_end_matches('/').to_string(),
                timeout,
                stages,
                session,
                policy,
                coordinator,
                reporter,
                notifier: hooks.notifier,
            }),
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    /// Send a request with the default reporting options.
    pub async fn execute(&self, request: ApiRequest) -> std::result::Result<ApiResponse, ClassifiedError> {
        self.execute_with(request, &ReportOptions::default()).await
    }

    pub async fn execute_with(
        &self,
        request: ApiRequest,
        options: &ReportOptions,
    ) -> std::result::Result<ApiResponse, ClassifiedError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.run(request, options, request_id).await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method, path = %request.path))]
    async fn run(
        &self,
        mut request: ApiRequest,
        options: &ReportOptions,
        request_id: String,
    ) -> std::result::Result<ApiResponse, ClassifiedError> {
        let (mut retry, _) = RetryState::Initial.begin();

        loop {
            let outbound = self.prepare(&request).await;
            let failure = match self.send(outbound).await {
                Ok(response) => {
                    retry = retry.on_success();
                    debug!(status = %response.status, state = ?retry, "request succeeded");
                    return Ok(response);
                }
                Err(failure) => failure,
            };

            if failure.status() == Some(401)
                && request.refresh_on_unauthorized
                && !request.refresh_retried
            {
                request.refresh_retried = true;
                debug!("access token rejected, waiting for refresh");
                match self.inner.coordinator.recover().await {
                    Ok(_) => {
                        info!("replaying request with refreshed token");
                        continue;
                    }
                    Err(err) => return Err(err.with_context("request_id", request_id)),
                }
            }

            if request.refresh_retried {
                return Err(self.fail(&failure, options, &request_id));
            }

            let (next, action) = retry.on_failure(&failure, &self.inner.policy);
            retry = next;
            let delay = match action {
                RetryAction::Wait(delay) => delay,
                RetryAction::Send => Duration::ZERO,
                RetryAction::Stop => {
                    debug_assert!(retry.is_terminal(), "stopped in {retry:?}");
                    debug!(state = ?retry, "giving up on request");
                    return Err(self.fail(&failure, options, &request_id));
                }
            };

            let reason = failure
                .status()
                .map_or_else(|| "network".to_string(), |s| s.to_string());
            if failure.status() == Some(429) {
                self.inner.notifier.notify(Notice::warning(
                    format!(
                        "Too many requests. Retrying in {}s.",
                        delay.as_secs_f64().ceil() as u64
                    ),
                    delay,
                ));
            }
            warn!(
                attempt = retry.attempt(),
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "retrying request"
            );
            metrics::record_retry(&reason);
            request.attempt = retry.attempt();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Fresh outbound copy of the logical request with every stage applied.
    async fn prepare(&self, request: &ApiRequest) -> ApiRequest {
        let mut outbound = request.clone();
        for stage in &self.inner.stages {
            trace!(stage = stage.name(), "applying request stage");
            stage.apply(&mut outbound).await;
        }
        outbound
    }

    async fn send(&self, outbound: ApiRequest) -> std::result::Result<ApiResponse, Failure> {
        let url = self.url(&outbound.path, &outbound.query)?;
        let method = outbound.method.clone();

        let mut builder = self
            .inner
            .http
            .request(outbound.method, url)
            .headers(outbound.headers)
            .timeout(self.inner.timeout);
        builder = match outbound.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(
                serde_json::to_vec(&value)
                    .map_err(|e| Failure::Internal(format!("failed to encode body: {e}")))?,
            ),
            RequestBody::Multipart(fields) => builder.multipart(multipart_form(fields)?),
        };

        let started = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_request(method.as_str(), None, started.elapsed().as_secs_f64());
                return Err(failure_from_transport(e));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(failure_from_transport)?;
        metrics::record_request(
            method.as_str(),
            Some(status.as_u16()),
            started.elapsed().as_secs_f64(),
        );

        if status.is_success() {
            return Ok(ApiResponse { status, body });
        }

        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(Failure::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
            retry_after,
        })
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> std::result::Result<Url, Failure> {
        let raw = format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|e| Failure::Internal(format!("invalid request url {raw}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn fail(&self, failure: &Failure, options: &ReportOptions, request_id: &str) -> ClassifiedError {
        let options = options.clone().with_context("request_id", request_id);
        self.inner.reporter.handle(failure, &options)
    }
}

fn multipart_form(fields: Vec<MultipartField>) -> std::result::Result<Form, Failure> {
    let mut form = Form::new();
    for field in fields {
        form = match field.value {
            MultipartValue::Text(value) => form.text(field.name, value),
            MultipartValue::File {
                file_name,
                content_type,
                bytes,
            } => {
                let part = Part::bytes(bytes.to_vec())
                    .file_name(file_name)
                    .mime_str(&content_type)
                    .map_err(|e| Failure::Internal(format!("invalid content type: {e}")))?;
                form.part(field.name, part)
            }
        };
    }
    Ok(form)
}

fn failure_from_transport(e: reqwest::Error) -> Failure {
    if e.is_builder() {
        Failure::Internal(format!("failed to build request: {e}"))
    } else if e.is_timeout() {
        Failure::Network {
            timeout: true,
            message: format!("request timed out: {e}"),
        }
    } else {
        Failure::Network {
            timeout: false,
            message: format!("request failed: {e}"),
        }
    }
}
