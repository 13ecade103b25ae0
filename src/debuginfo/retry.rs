// src/debuginfo/retry.rs
//! Bounded retries with exponential backoff and jitter, as an explicit state machine.

use super::DebugInfoError;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How retry waits are performed. Swapped out in tests to avoid real sleeping.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Un-jittered delay before attempt `attempt + 1`: base * 2^(attempt-1).
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Delay with ±25% jitter applied.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = rand::rng().random_range(-0.25..=0.25);
        jitter(self.base_backoff(attempt), factor)
    }
}

/// Scale `base` by `1 + factor`, never going below zero.
pub fn jitter(base: Duration, factor: f64) -> Duration {
    Duration::from_secs_f64((base.as_secs_f64() * (1.0 + factor)).max(0.0))
}

#[derive(Debug)]
pub enum RetryState<T> {
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded(T),
    Exhausted(DebugInfoError),
}

/// Run `op` until it succeeds, fails permanently, or the policy runs out.
/// Both the attempt and the backoff wait race `cancel`.
pub async fn run<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, DebugInfoError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DebugInfoError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut state = RetryState::Attempting { attempt: 1 };

    loop {
        state = match state {
            RetryState::Attempting { attempt } => {
                if cancel.is_cancelled() {
                    return Err(DebugInfoError::Cancelled);
                }
                let outcome = tokio::select! {
                    res = op(attempt) => res,
                    _ = cancel.cancelled() => return Err(DebugInfoError::Cancelled),
                };
                match outcome {
                    Ok(value) => RetryState::Succeeded(value),
                    Err(err) if !err.is_retryable() || attempt >= max_attempts => {
                        RetryState::Exhausted(err)
                    }
                    Err(err) => {
                        let delay = policy.backoff_delay(attempt);
                        tracing::debug!("attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
                        RetryState::Backoff { attempt, delay }
                    }
                }
            }
            RetryState::Backoff { attempt, delay } => {
                tokio::select! {
                    _ = sleeper.sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(DebugInfoError::Cancelled),
                }
                RetryState::Attempting {
                    attempt: attempt + 1,
                }
            }
            RetryState::Succeeded(value) => return Ok(value),
            RetryState::Exhausted(err) => return Err(err),
        };
    }
}
