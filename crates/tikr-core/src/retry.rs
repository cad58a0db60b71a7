//! Retry policy for provider requests.
//!
//! Request failures are classified into a [`FailureClass`]; a [`RetryPolicy`]
//! turns each classified failure into a [`RetryDecision`]. The decision logic
//! is pure so every path can be tested without a network.

use std::time::Duration;

use crate::error::TikrError;

/// Backoff strategy between transient retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Delay of `base * factor^retry`, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Multiplier per retry.
        factor: f64,
        /// Upper bound on any single delay.
        max: Duration,
        /// Apply +/- 50% random jitter.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(4),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Returns the delay before the given retry (0-based).
    #[must_use]
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let seconds = (base.as_secs_f64() * factor.powi(exponent)).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(seconds);
                if !jitter {
                    return delay;
                }
                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let spread = millis / 2;
                let offset = fastrand::u64(0..=spread.saturating_mul(2));
                Duration::from_millis(millis.saturating_sub(spread).saturating_add(offset))
            }
        }
    }
}

/// Classification of one failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// The provider rejected the session (401/403/502, or an error body).
    SessionExpired {
        /// HTTP status of the response; 200 for body-signalled expiry.
        status: u16,
    },
    /// Worth retrying after a delay (5xx, 408, 429, timeout, connection error).
    Transient {
        /// Description of the failure.
        cause: String,
    },
    /// Never retried.
    Fatal {
        /// Description of the failure.
        cause: String,
    },
}

impl FailureClass {
    /// Classifies an HTTP status code. Returns `None` for success codes.
    #[must_use]
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 | 502 => Some(Self::SessionExpired { status }),
            408 | 429 | 500..=599 => Some(Self::Transient {
                cause: format!("HTTP {status}"),
            }),
            _ => Some(Self::Fatal {
                cause: format!("HTTP {status}"),
            }),
        }
    }
}

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Refresh the credential, then repeat the request immediately.
    RefreshCredential,
    /// Sleep, then repeat the request with the same credential.
    RetryAfter(Duration),
    /// Give up with this error.
    Fail(TikrError),
}

/// Budgets spent so far for one logical request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    refreshes: u32,
    retries: u32,
}

impl RetryState {
    /// Creates a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request is about to be sent.
    pub const fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Number of requests sent.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of credential refreshes performed.
    #[must_use]
    pub const fn refreshes(&self) -> u32 {
        self.refreshes
    }
}

/// Retry budgets for provider requests.
///
/// A session-expired signal triggers at most `max_refreshes` credential
/// refreshes. After that a 401/403 is an authentication failure and a 502 is
/// handled as transient. Transient failures are retried at most
/// `max_transient_retries` times before surfacing `UpstreamUnavailable`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Credential refreshes allowed per request.
    pub max_refreshes: u32,
    /// Additional attempts allowed for transient failures.
    pub max_transient_retries: u32,
    /// Delay strategy between transient retries.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_refreshes: 1,
            max_transient_retries: 2,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Returns a policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_refreshes: 0,
            max_transient_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Decides how to react to a failure, updating the spent budgets.
    pub fn decide(&self, state: &mut RetryState, failure: FailureClass) -> RetryDecision {
        match failure {
            FailureClass::SessionExpired { .. } if state.refreshes < self.max_refreshes => {
                state.refreshes += 1;
                RetryDecision::RefreshCredential
            }
            FailureClass::SessionExpired { status: 502 } => self.transient(
                state,
                "HTTP 502 persisted after credential refresh".to_string(),
            ),
            FailureClass::SessionExpired { status } => RetryDecision::Fail(
                TikrError::Authentication(format!(
                    "session rejected after credential refresh (HTTP {status})"
                )),
            ),
            FailureClass::Transient { cause } => self.transient(state, cause),
            FailureClass::Fatal { cause } => RetryDecision::Fail(TikrError::UpstreamUnavailable {
                attempts: state.attempts,
                cause,
            }),
        }
    }

    fn transient(&self, state: &mut RetryState, cause: String) -> RetryDecision {
        if state.retries < self.max_transient_retries {
            let delay = self.backoff.delay(state.retries);
            state.retries += 1;
            RetryDecision::RetryAfter(delay)
        } else {
            RetryDecision::Fail(TikrError::UpstreamUnavailable {
                attempts: state.attempts,
                cause,
            })
        }
    }
}
