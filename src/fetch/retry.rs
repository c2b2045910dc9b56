//! Retry logic with exponential backoff around a single strategy.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying raised fetch errors and determining retry behavior.
//!
//! # Overview
//!
//! When a strategy raises, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - `429`, `502`, `503` or a timeout; retried with backoff
//! - [`FailureType::AuthDenied`] - `403`; retried once after a short fixed delay
//! - [`FailureType::NonRetryable`] - anything else; aborted immediately
//!
//! Auth-denied retries are capped at two attempts regardless of
//! `max_retries`, so access-controlled content is not hammered.
//!
//! # Example
//!
//! ```
//! use oa_downloader_core::fetch::{FailureType, RetryDecision, RetryPolicy, classify_message};
//!
//! let policy = RetryPolicy::default();
//! let failure_type = classify_message("HTTP 503 Service Unavailable");
//! assert_eq!(failure_type, FailureType::Transient);
//!
//! match policy.should_retry(failure_type, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use super::{FetchError, FetchOutcome, FetchStrategy, invoke_isolated};

/// Default maximum attempts for transient failures (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default base delay for exponential backoff (2 seconds).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Fixed delay before the single auth-denied retry.
const DEFAULT_AUTH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Auth-denied invocations never exceed this many attempts.
const AUTH_DENIED_MAX_ATTEMPTS: u32 = 2;

/// Upper bound (exclusive) of the random jitter added to every delay.
const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Exponent cap so the backoff computation cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Classification of a raised fetch error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: HTTP 429, 502, 503, timeouts.
    Transient,

    /// Access denied (HTTP 403). Retried once.
    AuthDenied,

    /// Anything else. Never retried.
    NonRetryable,
}

/// Decision on whether to retry a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the invocation after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the invocation.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// What happened across one retry-wrapped invocation sequence.
#[derive(Debug, Clone, Default)]
pub struct RetryOutcome {
    /// The last outcome the strategy returned, if it returned at all.
    pub outcome: Option<FetchOutcome>,
    /// Number of strategy invocations made.
    pub attempts: u32,
    /// Message of the last raised error, if any.
    pub last_error: Option<String>,
    /// Classification of the last raised error, if any.
    pub last_failure: Option<FailureType>,
}

impl RetryOutcome {
    /// Returns true if the sequence ended with a saved artifact.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.as_ref().is_some_and(FetchOutcome::is_success)
    }
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `base_delay`: 2 seconds
/// - `auth_retry_delay`: 1 second
/// - `max_jitter`: 1 second (exclusive)
///
/// # Delay Calculation
///
/// ```text
/// transient:   delay = base_delay * 2^(attempt - 1) + jitter
/// auth-denied: delay = auth_retry_delay + jitter
/// ```
///
/// With defaults, transient delays are approximately: 2s, 4s, 8s, 16s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts for transient failures (including the first).
    max_attempts: u32,

    /// Base delay for the first transient retry.
    base_delay: Duration,

    /// Fixed delay before the auth-denied retry.
    auth_retry_delay: Duration,

    /// Exclusive upper bound for random jitter.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            auth_retry_delay: DEFAULT_AUTH_RETRY_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Base delay for the first transient retry
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Overrides the auth-denied retry delay and the jitter bound.
    ///
    /// Mostly useful for tests that should not sleep for real.
    #[must_use]
    pub fn with_delays(mut self, auth_retry_delay: Duration, max_jitter: Duration) -> Self {
        self.auth_retry_delay = auth_retry_delay;
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the configured base delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Determines whether to retry a failed invocation.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::NonRetryable => RetryDecision::DoNotRetry {
                reason: "non-retryable failure - retry would not help".to_string(),
            },
            FailureType::AuthDenied => {
                let cap = AUTH_DENIED_MAX_ATTEMPTS.min(self.max_attempts);
                if attempt >= cap {
                    return RetryDecision::DoNotRetry {
                        reason: format!("access denied - auth retry budget ({cap}) exhausted"),
                    };
                }
                RetryDecision::Retry {
                    delay: self.auth_retry_delay + self.calculate_jitter(),
                    attempt: attempt + 1,
                }
            }
            FailureType::Transient => {
                if attempt >= self.max_attempts {
                    debug!(attempt, max = self.max_attempts, "max attempts reached");
                    return RetryDecision::DoNotRetry {
                        reason: format!("max attempts ({}) exhausted", self.max_attempts),
                    };
                }

                let delay = self.calculate_delay(attempt);
                debug!(
                    attempt,
                    next_attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "will retry"
                );
                RetryDecision::Retry {
                    delay,
                    attempt: attempt + 1,
                }
            }
        }
    }

    /// Runs `strategy` against `url`, retrying raised errors per this policy.
    ///
    /// A strategy that returns normally (artifact or miss) ends the sequence.
    /// No error escapes: failures are reported on the [`RetryOutcome`].
    #[instrument(skip(self, strategy, target), fields(strategy = strategy.name(), url = %url))]
    pub async fn run(
        &self,
        strategy: &Arc<dyn FetchStrategy>,
        url: &str,
        target: &Path,
    ) -> RetryOutcome {
        let mut attempt = 0u32;
        let mut last_error = None;
        let mut last_failure = None;

        loop {
            attempt += 1;
            debug!(attempt, "invoking strategy");

            match invoke_isolated(strategy, url, target).await {
                Ok(outcome) => {
                    return RetryOutcome {
                        outcome: Some(outcome),
                        attempts: attempt,
                        last_error,
                        last_failure,
                    };
                }
                Err(error) => {
                    let failure_type = classify_error(&error);
                    last_error = Some(error.to_string());
                    last_failure = Some(failure_type);

                    match self.should_retry(failure_type, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            info!(
                                attempt = next_attempt,
                                max_attempts = self.max_attempts,
                                delay_ms = delay.as_millis(),
                                failure = ?failure_type,
                                error = %error,
                                "retrying strategy"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            warn!(error = %error, %reason, attempts = attempt, "strategy failed");
                            return RetryOutcome {
                                outcome: None,
                                attempts: attempt,
                                last_error,
                                last_failure,
                            };
                        }
                    }
                }
            }
        }
    }

    /// Calculates the transient delay for a retry with exponential backoff and jitter.
    ///
    /// Formula: `base_delay * 2^(attempt - 1) + jitter`
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent) + self.calculate_jitter()
    }

    /// Generates random jitter in `[0, max_jitter)`.
    fn calculate_jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..max_ms))
    }
}

/// Classifies an error message by its content.
///
/// | Contains | Type |
/// |----------|------|
/// | `429`, `timeout`, `502`, `503` | Transient |
/// | `403` | AuthDenied |
/// | anything else | NonRetryable |
///
/// Matching is case-insensitive.
#[must_use]
pub fn classify_message(message: &str) -> FailureType {
    let message = message.to_ascii_lowercase();
    let transient = ["429", "timeout", "502", "503"]
        .iter()
        .any(|needle| message.contains(needle));
    if transient {
        FailureType::Transient
    } else if message.contains("403") {
        FailureType::AuthDenied
    } else {
        FailureType::NonRetryable
    }
}

/// Classifies a raised fetch error into a failure type for retry decisions.
///
/// Structured variants contribute only their own signal (status code,
/// timeout, source message), never the URL they carry.
#[must_use]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::Timeout { .. } => FailureType::Transient,
        _ => classify_message(&error.classification_text()),
    }
}
