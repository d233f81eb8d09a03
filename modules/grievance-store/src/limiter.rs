use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Process-wide token bucket for backend requests. Clones share one bucket,
/// so every task drawing from the store competes for the same budget.
#[derive(Clone)]
pub struct StoreRateLimiter {
    inner: Arc<DefaultDirectRateLimiter>,
}

impl StoreRateLimiter {
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN));
        Self {
            inner: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wait for a token.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    #[cfg(test)]
    fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }
}

impl std::fmt::Debug for StoreRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRateLimiter").finish_non_exhaustive()
    }
}
