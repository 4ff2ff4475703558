//! Bounded retries with linear backoff.
//!
//! The caller decides which failures are worth another attempt. Terminal
//! failures stop immediately. Running out of attempts is an ordinary
//! result, not a panic or a propagated transport error.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::RetryConfig;

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before 1-indexed `attempt`: nothing before the first,
    /// `base_delay × attempt` before every later one.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.base_delay.saturating_mul(attempt)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }
}

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Transport-level trouble; the same request may succeed later.
    Retryable,

    /// The other side said no; asking again will not change the answer.
    Terminal,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("terminal failure: {0}")]
    Terminal(E),

    #[error("gave up after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: E },

    /// Cancelled while waiting between attempts.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// How many attempts were actually made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Terminal(_) => 1,
            Self::MaxRetriesExceeded { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Runs `operation` until it succeeds, fails terminally, or runs out of attempts.
///
/// `on_attempt` is called with the 1-indexed attempt number right before each
/// try. Only the backoff sleep is cancellable; an operation that has started
/// is always awaited to completion.
pub async fn run<T, E, Op, Fut, C, A>(
    policy: RetryPolicy,
    classify: C,
    mut cancel: CancelToken,
    mut on_attempt: A,
    mut operation: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Classification,
    A: FnMut(u32),
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        on_attempt(attempt);

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if classify(&error) == Classification::Terminal {
            debug!(attempt, error = %error, "terminal failure, not retrying");
            return Err(RetryError::Terminal(error));
        }

        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %error, "retries exhausted");
            return Err(RetryError::MaxRetriesExceeded {
                attempts: attempt,
                last_error: error,
            });
        }

        attempt += 1;
        let delay = policy.delay_before(attempt);
        debug!(attempt, delay = ?delay, error = %error, "retrying after backoff");

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => {
                debug!(attempts = attempt - 1, "backoff cancelled");
                return Err(RetryError::Cancelled { attempts: attempt - 1 });
            }
        }
    }
}
