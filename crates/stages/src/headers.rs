//! Static headers sent with every request.
//!
//! Sets the fixed pipeline headers and any extra `[[headers]]` entries from
//! config. Extra entries may not overwrite the headers other stages own.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use session::{CLIENT_VERSION_HEADER, CSRF_HEADER, REQUESTED_WITH_HEADER, REQUESTED_WITH_VALUE};
use tracing::warn;

use crate::{ApiRequest, RequestStage};

/// Extra header rule (name + value pair from config).
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Fixed headers plus configured extras.
pub struct StaticHeaders {
    headers: HeaderMap,
}

impl StaticHeaders {
    pub fn new(client_version: &str, extra: &[HeaderInjection]) -> Self {
        let mut headers = HeaderMap::new();
        for injection in extra {
            let name = match HeaderName::from_str(&injection.name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if name == AUTHORIZATION || name == CONTENT_TYPE || name.as_str() == CSRF_HEADER {
                warn!(header = %injection.name, "refusing to configure a pipeline-owned header");
                continue;
            }
            let value = match HeaderValue::from_str(&injection.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            headers.insert(name, value);
        }

        headers.insert(
            HeaderName::from_static(REQUESTED_WITH_HEADER),
            HeaderValue::from_static(REQUESTED_WITH_VALUE),
        );
        match HeaderValue::from_str(client_version) {
            Ok(v) => {
                headers.insert(HeaderName::from_static(CLIENT_VERSION_HEADER), v);
            }
            Err(e) => {
                warn!(client_version, error = %e, "client version is not a valid header value");
            }
        }

        Self { headers }
    }
}

impl RequestStage for StaticHeaders {
    fn name(&self) -> &str {
        "static_headers"
    }

    fn apply<'a>(
        &'a self,
        request: &'a mut ApiRequest,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        // Multipart uploads get their Content-Type (with boundary) from the transport
        if request.body.is_multipart() {
            request.headers.remove(CONTENT_TYPE);
        } else {
            request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Box::pin(async {})
    }
}
