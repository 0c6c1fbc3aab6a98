//! Authorization header injection

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use session::{SessionStore, is_structurally_valid};
use tracing::{debug, warn};

use crate::{ApiRequest, RequestStage};

/// Attaches `Authorization: Bearer <token>` when the session holds a token
/// that passes the structural check. Any Authorization header already on
/// the request is dropped first; this stage owns it.
pub struct AuthHeaderInjector {
    session: Arc<SessionStore>,
}

impl AuthHeaderInjector {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }
}

impl RequestStage for AuthHeaderInjector {
    fn name(&self) -> &str {
        "auth"
    }

    fn apply<'a>(
        &'a self,
        request: &'a mut ApiRequest,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            request.headers.remove(AUTHORIZATION);

            let Some(token) = self.session.access_token().await else {
                debug!(path = %request.path, "no access token, sending unauthenticated");
                return;
            };

            if !is_structurally_valid(token.expose()) {
                warn!(path = %request.path, "access token is malformed, omitting Authorization header");
                return;
            }

            match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.headers.insert(AUTHORIZATION, value);
                }
                Err(e) => {
                    warn!(path = %request.path, error = %e, "access token is not a valid header value");
                }
            }
        })
    }
}
