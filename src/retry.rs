use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::FixtureError;

/// Exponential backoff around a single call site.
///
/// The delay after the `k`-th failed attempt is `multiplier * 2^(k - 1)`
/// seconds, clamped into `[min_delay, max_delay]`. Only [`FixtureError::is_transient`] errors
/// are retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::catalog()
    }
}

impl RetryPolicy {
    /// The EBI load balancer drops requests now and then; 2s..10s rides it out.
    pub fn catalog() -> Self {
        Self {
            max_attempts: 6,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 1.0,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Retries without sleeping between attempts.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 0.0,
        }
    }

    /// Delay after `attempt` (1-based) has failed.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = 2f64.powi(attempt.saturating_sub(1).min(30) as i32);
        let secs = (self.multiplier * exp).max(0.0);
        let max_delay = self.max_delay.max(self.min_delay);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(max_delay)
            .clamp(self.min_delay, max_delay)
    }

    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, FixtureError>
    where
        F: FnMut() -> Result<T, FixtureError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1usize;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        call = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
