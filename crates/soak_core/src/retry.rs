//! Bounded-attempt retry with linear backoff-with-jitter.
//!
//! The policy re-runs a fallible async action sequentially until it
//! succeeds, the attempt budget is exhausted, or the caller's deadline is
//! observed to have passed at a retry boundary. It never interrupts a
//! running attempt, never logs, and never terminates the process: both
//! failure modes come back as a [`RetryError`] for the caller to handle.

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::clock;

/// Linear backoff schedule with symmetric jitter.
///
/// Attempt `i` waits `base * i`, perturbed by a factor drawn uniformly
/// from `[1 - deviation, 1 + deviation]`. A zero deviation yields plain
/// linear backoff.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    pub base: Duration,
    pub deviation: f64,
}

impl Backoff {
    pub fn linear(base: Duration) -> Self {
        Self {
            base,
            deviation: 0.0,
        }
    }

    pub fn with_jitter(base: Duration, deviation: f64) -> Self {
        Self {
            base,
            deviation: deviation.clamp(0.0, 1.0),
        }
    }

    /// Delay slept after attempt `attempt` fails.
    fn delay(&self, attempt: u32, rng: &mut SmallRng) -> Duration {
        let scaled = self.base.saturating_mul(attempt.max(1));
        if self.deviation <= 0.0 {
            return scaled;
        }
        let factor = rng.gen_range(1.0 - self.deviation..=1.0 + self.deviation);
        scaled.mul_f64(factor.max(0.0))
    }
}

/// Terminal outcome of a retry sequence that never succeeded.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: Error + 'static> {
    /// Every allowed attempt failed.
    #[error("retries exhausted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
    /// The invocation deadline passed at a retry boundary.
    #[error("deadline exceeded after {attempts} attempts")]
    DeadlineExceeded {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E: Error + 'static> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }
}

/// Attempt budget and backoff schedule for one call site.
///
/// Call sites differ widely: reads run with short budgets and a handful of
/// attempts, writes and deletes under contention with thousands of
/// attempts and millisecond-scale backoff bases. Both extremes go through
/// the same policy.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Run `action` until it succeeds or the policy gives up.
    ///
    /// `action` receives the 1-based attempt index. Attempts are strictly
    /// sequential on the calling task. The deadline is only checked
    /// between attempts; respecting it mid-attempt is the action's job.
    pub async fn run<T, E, F, Fut>(
        &self,
        deadline: Instant,
        mut action: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Error + 'static,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut rng = SmallRng::seed_from_u64(clock::rng_seed());
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match action(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    if Instant::now() >= deadline {
                        return Err(RetryError::DeadlineExceeded {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tokio::time::sleep(self.backoff.delay(attempt, &mut rng)).await;
                }
            }
            attempt += 1;
        }
    }
}
