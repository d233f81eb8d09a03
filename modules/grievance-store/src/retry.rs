use std::future::Future;
use std::time::Duration;

use grievance_common::{GrievanceError, StoreSettings};
use rand::Rng;
use tracing::{error, warn};

use crate::limiter::StoreRateLimiter;
use crate::sheet::SheetError;

/// Exponential backoff with jitter for transient backend failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&StoreSettings> for RetryPolicy {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.backoff_base,
            max_delay: settings.backoff_max,
        }
    }
}

impl RetryPolicy {
    /// Ceiling for the delay after the given failed attempt (0-based):
    /// base * 2^attempt, capped at `max_delay`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Half the ceiling plus a random share of the other half.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let half = ceiling / 2;
        let spread = (ceiling - half).as_millis() as u64;
        let jitter = if spread == 0 {
            0
        } else {
            rand::rng().random_range(0..=spread)
        };
        half + Duration::from_millis(jitter)
    }

    /// Run `op` under the rate limiter, retrying transient failures. Every
    /// attempt, the first included, waits for a limiter token. Exhaustion and
    /// permanent failures both surface as `PersistenceUnavailable`.
    pub async fn run<T, F, Fut>(
        &self,
        limiter: &StoreRateLimiter,
        operation: &str,
        mut op: F,
    ) -> Result<T, GrievanceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SheetError>>,
    {
        let mut attempt = 0;
        loop {
            limiter.acquire().await;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend call failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(operation, attempts = attempt + 1, error = %e, "Backend call gave up");
                    return Err(GrievanceError::PersistenceUnavailable {
                        attempts: attempt + 1,
                        message: format!("{operation}: {e}"),
                    });
                }
            }
        }
    }
}
