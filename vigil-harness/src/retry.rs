//! Retry with exponential backoff
//!
//! Transient failures (flaky upstream endpoints, token services warming up)
//! are retried inside the business logic rather than surfaced as faults.
//! Attempts can optionally be noted in the run log at `Info`, which keeps
//! them in the durable record without degrading the run's status.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::logger::RunLogger;

/// Backoff schedule for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before the final error is returned.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt.
    pub backoff: f64,
    /// Cap on the per-attempt delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Calls `operation` until it succeeds or `max_attempts` is exhausted,
    /// sleeping between attempts. The final error is returned unchanged.
    pub fn call<T, E, F>(
        &self,
        label: &str,
        logger: Option<&RunLogger>,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: fmt::Display,
    {
        let mut delay = self.initial_delay;
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) if attempt == attempts => return Err(error),
                Err(error) => {
                    self.note_attempt(label, logger, attempt, &error, delay);
                    std::thread::sleep(delay);
                    delay = next_delay(delay, self.backoff, self.max_delay);
                }
            }
        }

        unreachable!("loop returns on the final attempt")
    }

    /// Awaits `operation` until it succeeds or `max_attempts` is exhausted,
    /// sleeping between attempts without blocking the scheduler.
    pub async fn call_async<T, E, F, Fut>(
        &self,
        label: &str,
        logger: Option<&RunLogger>,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut delay = self.initial_delay;
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt == attempts => return Err(error),
                Err(error) => {
                    self.note_attempt(label, logger, attempt, &error, delay);
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, self.backoff, self.max_delay);
                }
            }
        }

        unreachable!("loop returns on the final attempt")
    }

    fn note_attempt(
        &self,
        label: &str,
        logger: Option<&RunLogger>,
        attempt: u32,
        error: &impl fmt::Display,
        delay: Duration,
    ) {
        debug!(
            operation = label,
            attempt,
            max_attempts = self.max_attempts,
            "attempt failed: {error}; retrying in {delay:?}"
        );
        if let Some(logger) = logger {
            let noted = logger.info(format!(
                "{label} attempt {attempt}/{} failed: {error}; retrying in {delay:?}",
                self.max_attempts
            ));
            if noted.is_err() {
                warn!(operation = label, "run log unavailable for retry record");
            }
        }
    }
}

fn next_delay(current: Duration, backoff: f64, max_delay: Duration) -> Duration {
    current.mul_f64(backoff).min(max_delay)
}
