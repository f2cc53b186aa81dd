//! One full scan pass: selection, dispatch, aggregation, persistence.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backfill::plan_backfill;
use crate::fetch::{TierFetcher, TieredFetchStrategy};
use crate::proxy::ProxyPool;
use crate::throttle::RequestThrottle;
use crate::worker::{FetchWorkerPool, TickerOutcome, WorkerEvent, WorkerSettings};
use crate::{
    ConfigError, FetchError, FetchErrorKind, QuoteRecord, RecordSink, ScanResult, ScanState, ScannerConfig,
    Ticker, UtcDateTime,
};

/// Drives scan passes over one proxy pool.
///
/// The deadline and the external cancellation token both end a pass early;
/// tickers that never resolved are reported as skipped.
pub struct ScanOrchestrator {
    config: ScannerConfig,
    pool: Arc<ProxyPool>,
    workers: FetchWorkerPool,
    sink: Option<Arc<dyn RecordSink>>,
    state: Mutex<ScanState>,
    cancel: CancellationToken,
}

impl ScanOrchestrator {
    /// Validates `config`, loads its proxy source and builds the pool.
    pub fn new(config: ScannerConfig, fetcher: Arc<dyn TierFetcher>) -> Result<Self, ConfigError> {
        config.validate()?;
        let endpoints = config.proxy_source.load()?;
        if endpoints.is_empty() && !config.allow_direct_fallback {
            warn!("proxy source is empty and direct fallback is disabled");
        }
        let pool = Arc::new(ProxyPool::new(endpoints, config.pool_config()));
        Self::with_pool(config, pool, fetcher)
    }

    /// Uses an existing pool; `config.proxy_source` is ignored.
    pub fn with_pool(
        config: ScannerConfig,
        pool: Arc<ProxyPool>,
        fetcher: Arc<dyn TierFetcher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let strategy = TieredFetchStrategy::new(fetcher, config.per_request_timeout)
            .with_throttle(RequestThrottle::from_limit(config.max_requests_per_second));
        let workers =
            FetchWorkerPool::new(strategy, Arc::clone(&pool), WorkerSettings::from_config(&config));

        Ok(Self {
            config,
            pool,
            workers,
            sink: None,
            state: Mutex::new(ScanState::Idle),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().expect("scan state lock is not poisoned")
    }

    /// Token that cancels the running pass (and any later one) when fired.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Applies backfill selection with `max_tickers`, then runs the pass.
    pub async fn run_backfill<H, S>(&self, hot: &[H], stale: &[S]) -> ScanResult
    where
        H: AsRef<str>,
        S: AsRef<str>,
    {
        let plan = plan_backfill(hot, stale, self.config.max_tickers);
        info!(
            selected = plan.tickers.len(),
            hot = plan.hot_selected,
            stale = plan.stale_selected,
            duplicates = plan.duplicates_dropped,
            invalid = plan.invalid_dropped,
            truncated = plan.truncated,
            "backfill selection"
        );
        self.run(plan.tickers).await
    }

    /// Scans `tickers` in order. Duplicates are scanned once.
    pub async fn run(&self, tickers: Vec<Ticker>) -> ScanResult {
        let mut seen = HashSet::with_capacity(tickers.len());
        let tickers: Vec<Ticker> = tickers
            .into_iter()
            .filter(|ticker| seen.insert(ticker.clone()))
            .collect();

        let scan_id = Uuid::new_v4();
        let started_at = UtcDateTime::now();
        let started = Instant::now();
        self.set_state(ScanState::Running);
        info!(
            %scan_id,
            tickers = tickers.len(),
            workers = self.config.worker_count,
            proxies = self.pool.len(),
            deadline_secs = self.config.deadline.as_secs(),
            "scan started"
        );

        let run_cancel = self.cancel.child_token();
        let mut run = self.workers.spawn(tickers.clone(), run_cancel.clone());
        let deadline = tokio::time::sleep(self.config.deadline);
        tokio::pin!(deadline);

        let mut aggregate = Aggregate::default();
        let mut stop_reason: Option<FetchError> = None;
        let total = tickers.len();

        loop {
            tokio::select! {
                event = run.events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        WorkerEvent::Resolved(outcome) => {
                            aggregate.absorb(outcome);
                            if aggregate.resolved.len() % self.config.batch_size == 0 {
                                info!(
                                    %scan_id,
                                    resolved = aggregate.resolved.len(),
                                    total,
                                    records = aggregate.records.len(),
                                    failures = aggregate.failures.len(),
                                    "scan progress"
                                );
                            }
                        }
                        WorkerEvent::PoolExhausted { ticker, error } => {
                            if stop_reason.is_none() {
                                warn!(
                                    %scan_id,
                                    %ticker,
                                    error = %error,
                                    pending = run.pending(),
                                    "proxy pool exhausted, stopping dispatch"
                                );
                                stop_reason = Some(error);
                                run_cancel.cancel();
                            }
                        }
                    }
                }
                _ = &mut deadline, if stop_reason.is_none() => {
                    warn!(%scan_id, pending = run.pending(), "scan deadline elapsed, cancelling in-flight work");
                    stop_reason = Some(FetchError::deadline_exceeded());
                    run_cancel.cancel();
                }
                _ = run_cancel.cancelled(), if stop_reason.is_none() => {
                    warn!(%scan_id, pending = run.pending(), "scan cancelled");
                    stop_reason = Some(FetchError::cancelled());
                }
            }
        }
        run.join().await;

        let skipped: Vec<Ticker> = tickers
            .into_iter()
            .filter(|ticker| !aggregate.resolved.contains(ticker))
            .collect();
        let status = match stop_reason.as_ref().map(FetchError::kind) {
            Some(FetchErrorKind::ProxyExhausted) => ScanState::Degraded,
            Some(_) => ScanState::Cancelled,
            None => ScanState::Completed,
        };

        let persisted_count = self.persist(&aggregate.records).await;
        let result = ScanResult {
            scan_id,
            status,
            started_at,
            total_symbols: total,
            records: aggregate.records,
            failures: aggregate.failures,
            skipped,
            duration: started.elapsed(),
            per_tier_counts: aggregate.per_tier_counts,
            quarantined_proxy_count: self.pool.quarantined_since(started),
            persisted_count,
            error: stop_reason,
        };
        self.set_state(status);

        info!(
            %scan_id,
            status = %result.status,
            total = result.total_symbols,
            records = result.real_data_count(),
            failed = result.failed_count(),
            skipped = result.skipped_count(),
            quarantined = result.quarantined_proxy_count,
            duration_ms = result.duration.as_millis() as u64,
            "scan finished"
        );
        result
    }

    /// Hands records to the sink in chunks of `batch_size`. A failing chunk is
    /// logged and the remaining chunks are still attempted.
    async fn persist(&self, records: &[QuoteRecord]) -> usize {
        if self.config.dry_run {
            info!(records = records.len(), "dry run, skipping persistence");
            return 0;
        }
        let Some(sink) = &self.sink else {
            return 0;
        };

        let mut persisted = 0;
        for chunk in records.chunks(self.config.batch_size) {
            let sink = Arc::clone(sink);
            let chunk = chunk.to_vec();
            let size = chunk.len();
            match tokio::task::spawn_blocking(move || sink.persist(&chunk)).await {
                Ok(Ok(count)) => persisted += count,
                Ok(Err(error)) => warn!(%error, records = size, "failed to persist chunk"),
                Err(error) => warn!(%error, records = size, "persistence task failed"),
            }
        }
        persisted
    }

    fn set_state(&self, state: ScanState) {
        *self.state.lock().expect("scan state lock is not poisoned") = state;
    }
}

#[derive(Default)]
struct Aggregate {
    resolved: HashSet<Ticker>,
    records: Vec<QuoteRecord>,
    failures: BTreeMap<Ticker, FetchError>,
    per_tier_counts: BTreeMap<crate::Tier, usize>,
}

impl Aggregate {
    fn absorb(&mut self, outcome: TickerOutcome) {
        match outcome {
            TickerOutcome::Fetched { record, tier, .. } => {
                if self.resolved.insert(record.ticker.clone()) {
                    *self.per_tier_counts.entry(tier).or_default() += 1;
                    self.records.push(record);
                }
            }
            TickerOutcome::Failed { ticker, error, .. } => {
                if self.resolved.insert(ticker.clone()) {
                    self.failures.insert(ticker, error);
                }
            }
        }
    }
}
