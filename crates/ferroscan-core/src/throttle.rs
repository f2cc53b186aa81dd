use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Upstream call budget shared by every tier call of every fetch worker.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DirectRateLimiter>,
    per_second: NonZeroU32,
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("per_second", &self.per_second)
            .finish()
    }
}

impl RequestThrottle {
    /// Allows `per_second` requests per second with a burst of the same size.
    pub fn per_second(per_second: NonZeroU32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            per_second,
        }
    }

    /// Builds a throttle from an optional limit; `None` or zero disables it.
    pub fn from_limit(limit: Option<u32>) -> Option<Self> {
        limit.and_then(NonZeroU32::new).map(Self::per_second)
    }

    pub const fn limit(&self) -> u32 {
        self.per_second.get()
    }

    /// Takes budget if it is available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Waits until budget is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rejects_once_burst_is_spent() {
        let throttle = RequestThrottle::per_second(NonZeroU32::new(2).expect("non-zero"));

        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire(), "third request should wait");
    }

    #[test]
    fn zero_or_missing_limit_disables_throttling() {
        assert!(RequestThrottle::from_limit(None).is_none());
        assert!(RequestThrottle::from_limit(Some(0)).is_none());
        assert_eq!(
            RequestThrottle::from_limit(Some(25)).map(|throttle| throttle.limit()),
            Some(25)
        );
    }

    #[tokio::test]
    async fn acquire_waits_for_budget() {
        let throttle = RequestThrottle::per_second(NonZeroU32::new(20).expect("non-zero"));
        let started = std::time::Instant::now();
        for _ in 0..21 {
            throttle.acquire().await;
        }
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
