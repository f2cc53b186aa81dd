use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::tier::TierFetcher;
use crate::proxy::ProxyLease;
use crate::throttle::RequestThrottle;
use crate::{FetchError, FetchErrorKind, QuoteRecord, Ticker, Tier};

/// Result of running the tier chain for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The first tier whose output passed validation.
    Success { record: QuoteRecord, tier: Tier },
    /// Every tier answered but none produced a usable record. `tier` is the
    /// last one tried.
    Missing { tier: Tier, reason: FetchError },
    /// A call-ending failure (proxy, network, timeout or upstream throttling)
    /// on `tier`. Later tiers were not tried.
    Transport { tier: Tier, error: FetchError },
}

impl FetchOutcome {
    pub const fn tier(&self) -> Tier {
        match self {
            Self::Success { tier, .. } | Self::Missing { tier, .. } | Self::Transport { tier, .. } => {
                *tier
            }
        }
    }

    pub const fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Success { .. } => None,
            Self::Missing { reason, .. } => Some(reason),
            Self::Transport { error, .. } => Some(error),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Ordered fallback over tiers: summary, then detail, then history.
#[derive(Clone)]
pub struct TieredFetchStrategy {
    fetcher: Arc<dyn TierFetcher>,
    per_request_timeout: Duration,
    throttle: Option<RequestThrottle>,
}

impl TieredFetchStrategy {
    pub fn new(fetcher: Arc<dyn TierFetcher>, per_request_timeout: Duration) -> Self {
        Self {
            fetcher,
            per_request_timeout,
            throttle: None,
        }
    }

    /// Gates every tier call on `throttle`, so one fallback chain spends one
    /// permit per upstream request.
    pub fn with_throttle(mut self, throttle: Option<RequestThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Runs the tier chain for `ticker` through `proxy`.
    pub async fn fetch(&self, ticker: &Ticker, proxy: Option<&ProxyLease>) -> FetchOutcome {
        let mut missing: Option<(Tier, FetchError)> = None;

        for tier in Tier::ALL {
            if let Some(throttle) = &self.throttle {
                throttle.acquire().await;
            }

            let started = Instant::now();
            let call = self.fetcher.fetch_tier(ticker, tier, proxy);
            let result = match tokio::time::timeout(self.per_request_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::transport(format!(
                    "request timed out after {}ms",
                    self.per_request_timeout.as_millis()
                ))),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let error = match result {
                Ok(fields) => match QuoteRecord::from_fields(ticker.clone(), tier, fields) {
                    Ok(record) => {
                        debug!(%ticker, %tier, latency_ms, "tier produced a record");
                        return FetchOutcome::Success { record, tier };
                    }
                    Err(error) => error,
                },
                Err(error) => error,
            };

            if error.kind() != FetchErrorKind::Validation {
                debug!(%ticker, %tier, latency_ms, error = %error, "tier call failed");
                return FetchOutcome::Transport { tier, error };
            }

            debug!(%ticker, %tier, latency_ms, reason = %error, "tier returned no usable record");
            missing = Some((tier, error));
        }

        let (tier, reason) = missing.unwrap_or_else(|| {
            (
                Tier::History,
                FetchError::validation(format!("no tier answered for {ticker}")),
            )
        });
        FetchOutcome::Missing { tier, reason }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::fetch::TierFuture;
    use crate::QuoteFields;

    #[derive(Clone)]
    enum Script {
        Price(f64),
        Fields(QuoteFields),
        Fail(FetchError),
        Hang,
    }

    struct ScriptedFetcher {
        scripts: HashMap<Tier, Script>,
        calls: Mutex<Vec<Tier>>,
    }

    impl ScriptedFetcher {
        fn new(scripts: impl IntoIterator<Item = (Tier, Script)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Tier> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl TierFetcher for ScriptedFetcher {
        fn fetch_tier<'a>(
            &'a self,
            _ticker: &'a Ticker,
            tier: Tier,
            _proxy: Option<&'a ProxyLease>,
        ) -> TierFuture<'a> {
            self.calls.lock().expect("calls lock").push(tier);
            let script = self
                .scripts
                .get(&tier)
                .cloned()
                .unwrap_or_else(|| Script::Fail(FetchError::validation("no data")));
            Box::pin(async move {
                match script {
                    Script::Price(price) => Ok(QuoteFields::with_price(price)),
                    Script::Fields(fields) => Ok(fields),
                    Script::Fail(error) => Err(error),
                    Script::Hang => {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(QuoteFields::with_price(1.0))
                    }
                }
            })
        }
    }

    fn ticker() -> Ticker {
        Ticker::parse("AAPL").expect("valid ticker")
    }

    #[tokio::test]
    async fn first_tier_success_short_circuits() {
        let fetcher = ScriptedFetcher::new([(Tier::Summary, Script::Price(187.5))]);
        let strategy = TieredFetchStrategy::new(fetcher.clone(), Duration::from_secs(1));

        let outcome = strategy.fetch(&ticker(), None).await;

        match outcome {
            FetchOutcome::Success { record, tier } => {
                assert_eq!(tier, Tier::Summary);
                assert_eq!(record.price, 187.5);
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(fetcher.calls(), vec![Tier::Summary]);
    }

    #[tokio::test]
    async fn falls_through_to_history_tier() {
        let fetcher = ScriptedFetcher::new([
            (Tier::Summary, Script::Fail(FetchError::validation("empty result"))),
            (Tier::Detail, Script::Fields(QuoteFields::default())),
            (Tier::History, Script::Price(42.0)),
        ]);
        let strategy = TieredFetchStrategy::new(fetcher.clone(), Duration::from_secs(1));

        let outcome = strategy.fetch(&ticker(), None).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.tier().index(), 3);
        assert_eq!(fetcher.calls(), Tier::ALL.to_vec());
    }

    #[tokio::test]
    async fn invalid_price_escalates_instead_of_succeeding() {
        let fetcher = ScriptedFetcher::new([
            (Tier::Summary, Script::Price(f64::NAN)),
            (Tier::Detail, Script::Price(-3.0)),
            (Tier::History, Script::Price(0.0)),
        ]);
        let strategy = TieredFetchStrategy::new(fetcher, Duration::from_secs(1));

        let outcome = strategy.fetch(&ticker(), None).await;

        match outcome {
            FetchOutcome::Missing { tier, reason } => {
                assert_eq!(tier, Tier::History);
                assert_eq!(reason.kind(), FetchErrorKind::Validation);
            }
            other => panic!("expected missing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_stops_the_chain() {
        let fetcher = ScriptedFetcher::new([
            (Tier::Summary, Script::Fail(FetchError::validation("empty result"))),
            (
                Tier::Detail,
                Script::Fail(FetchError::transport("Connection refused")),
            ),
            (Tier::History, Script::Price(10.0)),
        ]);
        let strategy = TieredFetchStrategy::new(fetcher.clone(), Duration::from_secs(1));

        let outcome = strategy.fetch(&ticker(), None).await;

        assert!(matches!(outcome, FetchOutcome::Transport { tier: Tier::Detail, .. }));
        assert_eq!(fetcher.calls(), vec![Tier::Summary, Tier::Detail]);
    }

    #[tokio::test]
    async fn rate_limit_ends_the_call_but_stays_soft() {
        let fetcher = ScriptedFetcher::new([(
            Tier::Summary,
            Script::Fail(FetchError::rate_limited("upstream returned status 429")),
        )]);
        let strategy = TieredFetchStrategy::new(fetcher, Duration::from_secs(1));

        let outcome = strategy.fetch(&ticker(), None).await;

        let error = outcome.error().expect("error present");
        assert_eq!(error.kind(), FetchErrorKind::RateLimited);
        assert!(!error.failure_class().is_hard());
    }

    #[tokio::test]
    async fn throttle_spends_one_permit_per_tier_call() {
        // Given a 2/s budget and a ticker that only the history tier can serve
        let fetcher = ScriptedFetcher::new([
            (Tier::Summary, Script::Fail(FetchError::validation("empty result"))),
            (Tier::Detail, Script::Fail(FetchError::validation("no regularMarketPrice"))),
            (Tier::History, Script::Price(12.0)),
        ]);
        let strategy = TieredFetchStrategy::new(fetcher.clone(), Duration::from_secs(1))
            .with_throttle(RequestThrottle::from_limit(Some(2)));

        // When one fallback chain runs
        let started = Instant::now();
        let outcome = strategy.fetch(&ticker(), None).await;

        // Then three upstream calls were gated, so the third waited for a refill
        assert!(outcome.is_success());
        assert_eq!(fetcher.calls().len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn elapsed_timeout_is_a_hard_transport_error() {
        let fetcher = ScriptedFetcher::new([(Tier::Summary, Script::Hang)]);
        let strategy = TieredFetchStrategy::new(fetcher, Duration::from_millis(50));

        let outcome = strategy.fetch(&ticker(), None).await;

        match outcome {
            FetchOutcome::Transport { tier, error } => {
                assert_eq!(tier, Tier::Summary);
                assert!(error.message().contains("timed out"));
                assert!(error.failure_class().is_hard());
            }
            other => panic!("expected transport, got {other:?}"),
        }
    }
}
