//! Single-flight access-token recovery
//!
//! The first request to see a 401 starts one refresh exchange; every request
//! that fails while it is in flight queues behind it and receives the same
//! outcome. Waiters are resolved in arrival order.
//!
//! ```text
//! Idle --recover()--> Refreshing --exchange done--> Idle (drain waiters)
//! ```
//!
//! The exchange runs on its own task, so a caller that stops awaiting
//! `recover()` cannot leave the coordinator stuck in `Refreshing`.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use session::SessionStore;
use tokio::sync::{Mutex, oneshot};
use tracing::{info, warn};

use crate::classify::{ClassifiedError, ErrorCode};
use crate::notify::Navigator;
use crate::report::{ErrorReporter, ReportOptions};

type Outcome = std::result::Result<Secret<String>, ClassifiedError>;

/// Source of fresh access tokens.
///
/// Uses `Pin<Box<dyn Future>>` so the coordinator can hold it as a trait
/// object.
pub trait TokenExchange: Send + Sync {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = session::Result<String>> + Send + '_>>;
}

impl TokenExchange for session::RefreshClient {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = session::Result<String>> + Send + '_>> {
        Box::pin(async move { self.exchange().await.map(|r| r.access_token) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

struct State {
    phase: RefreshPhase,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
}

pub struct RefreshCoordinator {
    exchange: Arc<dyn TokenExchange>,
    session: Arc<SessionStore>,
    reporter: Arc<ErrorReporter>,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    state: Mutex<State>,
}

impl RefreshCoordinator {
    pub fn new(
        exchange: Arc<dyn TokenExchange>,
        session: Arc<SessionStore>,
        reporter: Arc<ErrorReporter>,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            session,
            reporter,
            navigator,
            login_route: login_route.into(),
            state: Mutex::new(State {
                phase: RefreshPhase::Idle,
                waiters: VecDeque::new(),
            }),
        }
    }

    pub async fn phase(&self) -> RefreshPhase {
        self.state.lock().await.phase
    }

    /// Number of callers waiting on the current refresh.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.waiters.len()
    }

    /// Obtain a new access token after a 401.
    ///
    /// Starts the exchange if none is running, otherwise joins the one in
    /// flight. On failure the session has already been cleared and the user
    /// sent to the login route by the time this returns.
    pub async fn recover(self: &Arc<Self>) -> Outcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            state.waiters.push_back(tx);
            if state.phase == RefreshPhase::Idle {
                state.phase = RefreshPhase::Refreshing;
                let this = Arc::clone(self);
                tokio::spawn(async move { this.refresh_and_drain().await });
            }
        }

        rx.await.unwrap_or_else(|_| {
            Err(ClassifiedError::new(
                ErrorCode::Internal,
                "token refresh task ended without a result",
            ))
        })
    }

    async fn refresh_and_drain(&self) {
        let outcome = match self.exchange.refresh().await {
            Ok(token) => {
                let token = Secret::new(token);
                if let Err(e) = self.session.set_access_token(token.clone()).await {
                    warn!(error = %e, "failed to persist refreshed access token");
                }
                info!("access token refreshed");
                metrics::counter!("api_token_refresh_total", "outcome" => "success").increment(1);
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, ending session");
                metrics::counter!("api_token_refresh_total", "outcome" => "failure").increment(1);
                if let Err(e) = self.session.clear().await {
                    warn!(error = %e, "failed to remove stored session");
                }
                let error = ClassifiedError::new(ErrorCode::SessionExpired, e.to_string());
                self.reporter.emit(&error, &ReportOptions::default());
                self.navigator.redirect(&self.login_route);
                Err(error)
            }
        };

        let waiters = {
            let mut state = self.state.lock().await;
            state.phase = RefreshPhase::Idle;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            // Receiver gone means the caller stopped waiting
            let _ = waiter.send(outcome.clone());
        }
    }
}
