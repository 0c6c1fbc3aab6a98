//! CSRF header injection for state-changing requests

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::{HeaderName, HeaderValue};
use session::{CSRF_HEADER, SessionStore};
use tracing::warn;

use crate::{ApiRequest, RequestStage};

/// Sets `X-CSRF-Token` on POST/PUT/PATCH/DELETE from the session token,
/// generating one if the session has none. Other methods never carry it.
pub struct CsrfInjector {
    session: Arc<SessionStore>,
}

impl CsrfInjector {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }
}

impl RequestStage for CsrfInjector {
    fn name(&self) -> &str {
        "csrf"
    }

    fn apply<'a>(
        &'a self,
        request: &'a mut ApiRequest,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let header = HeaderName::from_static(CSRF_HEADER);
            if !request.is_mutating() {
                request.headers.remove(&header);
                return;
            }

            let token = self.session.csrf_token().await;
            match HeaderValue::from_str(&token) {
                Ok(value) => {
                    request.headers.insert(header, value);
                }
                Err(e) => warn!(error = %e, "CSRF token is not a valid header value"),
            }
        })
    }
}
