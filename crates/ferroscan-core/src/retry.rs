//! Retry backoff with jitter, scaled by the recent failure rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Exponential retry backoff for fetch workers.
///
/// The delay for retry `attempt` (1-based) is
/// `min(max, base * 2^(attempt-1) * (1 + failure_rate_weight * rate))`,
/// then jittered by +/- 50% when `jitter` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// The initial backoff duration.
    pub base: Duration,
    /// The maximum duration to wait between retries.
    pub max: Duration,
    /// How strongly the recent failure rate stretches the delay.
    pub failure_rate_weight: f64,
    /// Whether to apply random jitter (+/- 50%) to the delay.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(5),
            failure_rate_weight: 2.0,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Calculate the delay before retry `attempt` given the current failure
    /// rate in `[0, 1]`.
    pub fn delay(self, attempt: u32, failure_rate: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let rate = if failure_rate.is_finite() {
            failure_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let scale = 2_f64.powi(exponent as i32) * (1.0 + self.failure_rate_weight.max(0.0) * rate);
        let seconds = (self.base.as_secs_f64() * scale).min(self.max.as_secs_f64());

        let mut delay = Duration::from_micros((seconds.max(0.0) * 1e6).round() as u64);

        // Apply jitter: +/- 50% of the delay
        if self.jitter {
            let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
            let random_offset = fastrand::u64(0..=(jitter_ms * 2));
            let total_ms = delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
            delay = Duration::from_millis(total_ms.max(0) as u64);
        }

        delay
    }
}

/// Process-wide exponentially weighted failure rate.
///
/// Stored as `f64` bits in an atomic so every worker can update it without a
/// lock.
#[derive(Debug)]
pub struct FailureRate {
    bits: AtomicU64,
    alpha: f64,
}

impl Default for FailureRate {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl FailureRate {
    /// `alpha` is the weight of each new observation, clamped to `(0, 1]`.
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha.min(1.0)
        } else {
            0.1
        };
        Self {
            bits: AtomicU64::new(0.0_f64.to_bits()),
            alpha,
        }
    }

    pub fn current(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Fold one attempt outcome into the rate and return the new value.
    pub fn record(&self, failed: bool) -> f64 {
        let sample = if failed { 1.0 } else { 0.0 };
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let value = f64::from_bits(current);
            let next = value + self.alpha * (sample - value);
            match self.bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn steady(base_ms: u64, max_ms: u64, weight: f64) -> Backoff {
        Backoff {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms),
            failure_rate_weight: weight,
            jitter: false,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = steady(100, 1_000, 0.0);

        assert_eq!(backoff.delay(1, 0.0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2, 0.0), Duration::from_millis(200));
        assert_eq!(backoff.delay(3, 0.0), Duration::from_millis(400));
        assert_eq!(backoff.delay(4, 0.0), Duration::from_millis(800));
        assert_eq!(backoff.delay(5, 0.0), Duration::from_secs(1)); // capped
    }

    #[test]
    fn test_failure_rate_stretches_delay() {
        let backoff = steady(100, 10_000, 2.0);

        assert_eq!(backoff.delay(1, 0.5), Duration::from_millis(200));
        assert_eq!(backoff.delay(2, 1.0), Duration::from_millis(600));
        // Out-of-range rates are clamped.
        assert_eq!(backoff.delay(1, 7.0), Duration::from_millis(300));
        assert_eq!(backoff.delay(1, f64::NAN), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff_with_jitter() {
        let backoff = Backoff {
            jitter: true,
            ..steady(100, 1_000, 0.0)
        };

        for _ in 0..10 {
            for attempt in 1..6 {
                let delay_ms = backoff.delay(attempt, 0.0).as_millis() as f64;
                let expected = (100.0 * 2_f64.powi(attempt as i32 - 1)).min(1000.0);

                assert!(delay_ms >= expected * 0.49, "attempt={attempt}, delay_ms={delay_ms}");
                assert!(delay_ms <= expected * 1.51, "attempt={attempt}, delay_ms={delay_ms}");
            }
        }
    }

    #[test]
    fn failure_rate_converges_toward_observations() {
        let rate = FailureRate::new(0.5);
        assert_eq!(rate.current(), 0.0);

        assert_eq!(rate.record(true), 0.5);
        assert_eq!(rate.record(true), 0.75);
        assert_eq!(rate.record(false), 0.375);
    }

    #[test]
    fn failure_rate_updates_are_lock_free_and_bounded() {
        let rate = Arc::new(FailureRate::new(0.05));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let rate = Arc::clone(&rate);
                std::thread::spawn(move || {
                    for step in 0..500 {
                        rate.record((worker + step) % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }

        let value = rate.current();
        assert!((0.0..=1.0).contains(&value), "rate={value}");
    }
}
