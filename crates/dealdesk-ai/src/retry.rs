//! Retry with exponential back-off for generation requests.
//!
//! The policy is an explicit state machine: an attempt either succeeds, fails
//! for good, or schedules a back-off after which the next attempt starts.
//! [`RetryPolicy::transition`] is pure; [`run_with_retry`] drives it and
//! performs the sleeps through a [`Clock`] so tests can observe the schedule
//! without waiting.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AiError;

/// Source of cooperative delays.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Where a logical request is in its retry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is about to run.
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed; wait `delay` before the next one.
    Backoff { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    /// The attempt budget ran out on a retriable failure.
    Exhausted { attempts: u32 },
    /// A non-retriable failure ended the request early.
    Aborted { attempts: u32 },
}

/// Input to [`RetryPolicy::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    Succeeded,
    Failed { retriable: bool },
    BackoffElapsed,
}

/// Attempt budget and back-off schedule.
///
/// With the defaults (5 attempts, 1 000 ms base):
///
/// | After attempt | Sleep before next attempt |
/// |---------------|---------------------------|
/// | 1             | 1 000 ms                  |
/// | 2             | 2 000 ms                  |
/// | 3             | 4 000 ms                  |
/// | 4             | 8 000 ms                  |
/// | 5             | none (exhausted)          |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt`: `base_delay * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Computes the next state. Events that do not apply to `state` leave it
    /// unchanged; terminal states absorb every event.
    #[must_use]
    pub fn transition(&self, state: RetryState, event: RetryEvent) -> RetryState {
        match (state, event) {
            (RetryState::Attempting { attempt }, RetryEvent::Succeeded) => {
                RetryState::Succeeded { attempts: attempt }
            }
            (RetryState::Attempting { attempt }, RetryEvent::Failed { retriable: false }) => {
                RetryState::Aborted { attempts: attempt }
            }
            (RetryState::Attempting { attempt }, RetryEvent::Failed { retriable: true }) => {
                if attempt >= self.max_attempts {
                    RetryState::Exhausted { attempts: attempt }
                } else {
                    RetryState::Backoff {
                        attempt,
                        delay: self.delay_after(attempt),
                    }
                }
            }
            (RetryState::Backoff { attempt, .. }, RetryEvent::BackoffElapsed) => {
                RetryState::Attempting {
                    attempt: attempt + 1,
                }
            }
            (state, _) => state,
        }
    }
}

/// Runs `operation` under `policy`, sleeping on `clock` between attempts.
///
/// `operation` receives the 1-based attempt number. A retriable failure on
/// the last attempt becomes [`AiError::ExhaustedRetries`] wrapping the final
/// error; a non-retriable failure is returned as-is.
pub(crate) async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    clock: &dyn Clock,
    mut operation: F,
) -> Result<T, AiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AiError>>,
{
    let mut state = RetryState::Attempting { attempt: 1 };
    let mut last: Option<Result<T, AiError>> = None;

    loop {
        state = match state {
            RetryState::Attempting { attempt } => {
                let result = operation(attempt).await;
                let event = match &result {
                    Ok(_) => RetryEvent::Succeeded,
                    Err(err) => RetryEvent::Failed {
                        retriable: err.is_retriable(),
                    },
                };
                last = Some(result);
                policy.transition(state, event)
            }
            RetryState::Backoff { attempt, delay } => {
                if let Some(Err(err)) = &last {
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    tracing::warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms,
                        error = %err,
                        "generation request failed, retrying after back-off"
                    );
                }
                clock.sleep(delay).await;
                policy.transition(state, RetryEvent::BackoffElapsed)
            }
            RetryState::Succeeded { .. } | RetryState::Aborted { .. } => {
                return last.unwrap_or_else(|| {
                    Err(AiError::Transient(
                        "retry loop finished without an attempt".to_owned(),
                    ))
                });
            }
            RetryState::Exhausted { attempts } => {
                let last = match last {
                    Some(Err(err)) => err,
                    Some(Ok(value)) => return Ok(value),
                    None => AiError::Transient("no attempt was made".to_owned()),
                };
                tracing::error!(attempts, error = %last, "generation request exhausted retries");
                return Err(AiError::ExhaustedRetries {
                    attempts,
                    last: Box::new(last),
                });
            }
        };
    }
}
