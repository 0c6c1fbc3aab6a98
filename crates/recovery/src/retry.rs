//! Retry policy and per-request retry state machine
//!
//! State transitions (one logical request):
//!
//! ```text
//! Initial --begin--> Attempting{0}
//! Attempting{n} --success--> Succeeded
//! Attempting{n} --retryable failure, n < max--> Attempting{n+1}  (Wait, or Send when the delay is zero)
//! Attempting{n} --retryable failure, n == max--> Exhausted        (Stop)
//! Attempting{n} --non-retryable failure--> NonRetryable           (Stop)
//! ```
//!
//! `n` counts retransmissions already made, so a request that always fails
//! with a retryable status is sent `max_retries + 1` times in total.

use std::time::Duration;

use rand::RngExt;

use crate::classify::Failure;
use crate::error::{Error, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Cap on the exponential part; jitter is added on top
    pub max_delay: Duration,
    /// Upper bound (exclusive) of the uniform jitter
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        max_jitter: Duration,
    ) -> Result<Self> {
        if base_delay > max_delay {
            return Err(Error::InvalidPolicy(format!(
                "base delay {}ms exceeds max delay {}ms",
                base_delay.as_millis(),
                max_delay.as_millis()
            )));
        }
        Ok(Self {
            max_retries,
            base_delay,
            max_delay,
            max_jitter,
        })
    }

    /// Whether the failure class is transient, ignoring the budget.
    pub fn is_retryable(&self, failure: &Failure) -> bool {
        match failure {
            Failure::Network { .. } => true,
            Failure::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Failure::Internal(_) | Failure::Other(_) => false,
        }
    }

    /// `attempt` is the number of retries already made.
    pub fn should_retry(&self, failure: &Failure, attempt: u32) -> bool {
        attempt < self.max_retries && self.is_retryable(failure)
    }

    /// `min(base * 2^attempt, max_delay)`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `attempt + 1`. A server-provided
    /// Retry-After replaces the computed value entirely.
    pub fn delay_for(&self, attempt: u32, failure: &Failure) -> Duration {
        if let Some(retry_after) = failure.retry_after() {
            return retry_after;
        }
        self.backoff(attempt) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max))
    }
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// HTTP-date values are not supported and yield `None`, which falls back to
/// computed backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Initial,
    Attempting { attempt: u32 },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
    NonRetryable { attempts: u32 },
}

/// What the pipeline should do after a transition.
///
/// `on_failure` yields `Send` instead of a zero-length `Wait`, so a
/// `Retry-After: 0` or a zero-delay policy resubmits at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Send,
    Wait(Duration),
    Stop,
}

impl RetryState {
    pub fn begin(self) -> (RetryState, RetryAction) {
        match self {
            RetryState::Initial => (RetryState::Attempting { attempt: 0 }, RetryAction::Send),
            other => (other, RetryAction::Stop),
        }
    }

    /// Retries made so far.
    pub fn attempt(&self) -> u32 {
        match self {
            RetryState::Initial => 0,
            RetryState::Attempting { attempt } => *attempt,
            RetryState::Succeeded { attempts }
            | RetryState::Exhausted { attempts }
            | RetryState::NonRetryable { attempts } => attempts.saturating_sub(1),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. }
                | RetryState::Exhausted { .. }
                | RetryState::NonRetryable { .. }
        )
    }

    pub fn on_success(self) -> RetryState {
        match self {
            RetryState::Attempting { attempt } => RetryState::Succeeded {
                attempts: attempt + 1,
            },
            other => other,
        }
    }

    pub fn on_failure(self, failure: &Failure, policy: &RetryPolicy) -> (RetryState, RetryAction) {
        let RetryState::Attempting { attempt } = self else {
            return (self, RetryAction::Stop);
        };
        let attempts = attempt + 1;
        if !policy.is_retryable(failure) {
            return (RetryState::NonRetryable { attempts }, RetryAction::Stop);
        }
        if !policy.should_retry(failure, attempt) {
            return (RetryState::Exhausted { attempts }, RetryAction::Stop);
        }
        let delay = policy.delay_for(attempt, failure);
        let action = if delay.is_zero() {
            RetryAction::Send
        } else {
            RetryAction::Wait(delay)
        };
        (
            RetryState::Attempting {
                attempt: attempt + 1,
            },
            action,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> Failure {
        Failure::Status {
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    fn network() -> Failure {
        Failure::Network {
            timeout: false,
            message: "connection refused".into(),
        }
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn retryable_statuses() {
        let policy = RetryPolicy::default();
        for code in [500, 502, 503, 504, 408, 429] {
            assert!(policy.is_retryable(&status(code)), "{code}");
        }
        for code in [400, 401, 403, 404, 409, 422] {
            assert!(!policy.is_retryable(&status(code)), "{code}");
        }
        assert!(policy.is_retryable(&network()));
        assert!(!policy.is_retryable(&Failure::Internal("bad url".into())));
    }

    #[test]
    fn budget_is_three_retries() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&status(500), 0));
        assert!(policy.should_retry(&status(500), 2));
        assert!(!policy.should_retry(&status(500), 3));
        assert!(!policy.should_retry(&network(), 3));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = no_jitter();
        assert_eq!(policy.backoff(0), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4_000));
        assert_eq!(policy.backoff(5), Duration::from_millis(30_000));
        assert_eq!(policy.backoff(64), Duration::from_millis(30_000));
    }

    #[test]
    fn jitter_stays_below_bound() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay_for(1, &status(503));
            assert!(delay >= Duration::from_millis(2_000));
            assert!(delay < Duration::from_millis(3_000));
        }
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let policy = RetryPolicy::default();
        let failure = Failure::Status {
            status: 429,
            body: String::new(),
            retry_after: parse_retry_after("2"),
        };
        assert_eq!(policy.delay_for(0, &failure), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(2, &failure), Duration::from_millis(2_000));
    }

    #[test]
    fn parse_retry_after_accepts_seconds_only() {
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn invalid_policy_rejected() {
        let err = RetryPolicy::new(
            3,
            Duration::from_secs(10),
            Duration::from_secs(1),
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn always_failing_request_is_sent_four_times() {
        let policy = no_jitter();
        let (mut state, mut action) = RetryState::Initial.begin();
        let mut sends = 0;
        let mut waits = Vec::new();
        loop {
            match action {
                RetryAction::Send => {
                    sends += 1;
                    (state, action) = state.on_failure(&status(500), &policy);
                }
                RetryAction::Wait(delay) => {
                    waits.push(delay);
                    action = RetryAction::Send;
                }
                RetryAction::Stop => break,
            }
        }
        assert_eq!(sends, 4);
        assert_eq!(state, RetryState::Exhausted { attempts: 4 });
        assert_eq!(
            waits,
            vec![
                Duration::from_millis(1_000),
                Duration::from_millis(2_000),
                Duration::from_millis(4_000)
            ]
        );
    }

    #[test]
    fn client_error_stops_immediately() {
        let (state, _) = RetryState::Initial.begin();
        let (state, action) = state.on_failure(&status(400), &RetryPolicy::default());
        assert_eq!(state, RetryState::NonRetryable { attempts: 1 });
        assert_eq!(action, RetryAction::Stop);
        assert!(state.is_terminal());
    }

    #[test]
    fn success_after_retry() {
        let (state, _) = RetryState::Initial.begin();
        let (state, action) = state.on_failure(&network(), &no_jitter());
        assert!(matches!(action, RetryAction::Wait(_)));
        assert_eq!(state.attempt(), 1);
        assert_eq!(state.on_success(), RetryState::Succeeded { attempts: 2 });
    }

    #[test]
    fn zero_delay_resubmits_without_waiting() {
        let failure = Failure::Status {
            status: 503,
            body: String::new(),
            retry_after: parse_retry_after("0"),
        };
        let (state, _) = RetryState::Initial.begin();
        let (state, action) = state.on_failure(&failure, &RetryPolicy::default());
        assert_eq!(action, RetryAction::Send);
        assert_eq!(state, RetryState::Attempting { attempt: 1 });

        let immediate = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO, Duration::ZERO).unwrap();
        let (state, action) = state.on_failure(&network(), &immediate);
        assert_eq!(action, RetryAction::Send);
        assert_eq!(state.attempt(), 2);
        assert!(!state.is_terminal());
    }

    #[test]
    fn terminal_states_do_not_move() {
        let exhausted = RetryState::Exhausted { attempts: 4 };
        assert_eq!(
            exhausted.on_failure(&status(500), &RetryPolicy::default()),
            (exhausted, RetryAction::Stop)
        );
        assert_eq!(exhausted.begin(), (exhausted, RetryAction::Stop));
    }
}
