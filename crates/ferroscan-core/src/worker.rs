//! Bounded-concurrency fetch workers.
//!
//! Each worker pulls tickers from one shared FIFO queue, leases a proxy,
//! runs the tier strategy and reports the resolved outcome over an mpsc
//! channel. Only the aggregator on the other end of the channel keeps
//! counters; workers share nothing mutable except the queue, the proxy pool
//! and the atomic failure rate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fetch::{FetchOutcome, TieredFetchStrategy};
use crate::proxy::{ProxyLease, ProxyPool, ReleaseOutcome};
use crate::retry::{Backoff, FailureRate};
use crate::{FetchError, QuoteRecord, ScannerConfig, Ticker, Tier};

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    SoftFailure,
    HardFailure,
}

/// One fetch attempt, emitted as a structured log event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchAttempt {
    pub ticker: Ticker,
    pub attempt: u32,
    pub tier: Tier,
    /// `None` for a direct connection.
    pub proxy: Option<String>,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl FetchAttempt {
    fn emit(&self) {
        let proxy = self.proxy.as_deref().unwrap_or("direct");
        match self.outcome {
            AttemptOutcome::Success => debug!(
                ticker = %self.ticker,
                attempt = self.attempt,
                tier = %self.tier,
                proxy,
                latency_ms = self.latency_ms,
                "fetch attempt succeeded"
            ),
            AttemptOutcome::SoftFailure | AttemptOutcome::HardFailure => debug!(
                ticker = %self.ticker,
                attempt = self.attempt,
                tier = %self.tier,
                proxy,
                latency_ms = self.latency_ms,
                hard = self.outcome == AttemptOutcome::HardFailure,
                error = self.error.as_deref().unwrap_or(""),
                "fetch attempt failed"
            ),
        }
    }
}

/// Final state of one ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum TickerOutcome {
    Fetched {
        record: QuoteRecord,
        tier: Tier,
        attempts: u32,
    },
    Failed {
        ticker: Ticker,
        error: FetchError,
        attempts: u32,
    },
}

impl TickerOutcome {
    pub fn ticker(&self) -> &Ticker {
        match self {
            Self::Fetched { record, .. } => &record.ticker,
            Self::Failed { ticker, .. } => ticker,
        }
    }
}

/// Message from a worker to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Resolved(TickerOutcome),
    /// The pool has nothing left to lease and direct fallback is off. `ticker`
    /// was not resolved.
    PoolExhausted { ticker: Ticker, error: FetchError },
}

/// Worker pool tuning, usually derived from [`ScannerConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub worker_count: usize,
    pub max_retries: u32,
    pub backoff: Backoff,
    pub allow_direct_fallback: bool,
    /// Longest wait for a quarantined pool to release an endpoint before the
    /// pool counts as exhausted.
    pub max_exhausted_wait: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            max_retries: config.max_retries,
            backoff: config.backoff(),
            allow_direct_fallback: config.allow_direct_fallback,
            max_exhausted_wait: config.max_exhausted_wait,
        }
    }
}

/// Handle to a running set of workers.
pub struct WorkerRun {
    pub events: mpsc::Receiver<WorkerEvent>,
    queue: Arc<Mutex<VecDeque<Ticker>>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerRun {
    /// Tickers still waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .expect("ticker queue lock is not poisoned")
            .len()
    }

    /// Waits for every worker task to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(error) = handle.await {
                warn!(%error, "fetch worker task ended abnormally");
            }
        }
    }
}

/// Fixed-size pool of fetch workers sharing one queue and one proxy pool.
#[derive(Clone)]
pub struct FetchWorkerPool {
    shared: Arc<Shared>,
}

struct Shared {
    strategy: TieredFetchStrategy,
    pool: Arc<ProxyPool>,
    settings: WorkerSettings,
    failure_rate: FailureRate,
}

enum Lease {
    Proxy(ProxyLease),
    Direct,
    Exhausted(FetchError),
    Cancelled,
}

enum Resolution {
    Done(TickerOutcome),
    Exhausted(FetchError),
    Cancelled,
}

impl FetchWorkerPool {
    pub fn new(strategy: TieredFetchStrategy, pool: Arc<ProxyPool>, settings: WorkerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                strategy,
                pool,
                settings,
                failure_rate: FailureRate::default(),
            }),
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.shared.settings
    }

    /// Current exponentially weighted failure rate across all workers.
    pub fn failure_rate(&self) -> f64 {
        self.shared.failure_rate.current()
    }

    /// Enqueues `tickers` in order and starts the workers. Workers exit when
    /// the queue is drained, `cancel` fires or the receiver is dropped.
    pub fn spawn(&self, tickers: Vec<Ticker>, cancel: CancellationToken) -> WorkerRun {
        let worker_count = self.shared.settings.worker_count.max(1).min(tickers.len().max(1));
        let queue = Arc::new(Mutex::new(VecDeque::from(tickers)));
        let (sender, events) = mpsc::channel(worker_count * 2);

        let handles = (0..worker_count)
            .map(|worker_id| {
                let shared = Arc::clone(&self.shared);
                let queue = Arc::clone(&queue);
                let sender = sender.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { shared.work(worker_id, queue, sender, cancel).await })
            })
            .collect();

        WorkerRun {
            events,
            queue,
            handles,
        }
    }
}

impl Shared {
    async fn work(
        &self,
        worker_id: usize,
        queue: Arc<Mutex<VecDeque<Ticker>>>,
        sender: mpsc::Sender<WorkerEvent>,
        cancel: CancellationToken,
    ) {
        debug!(worker_id, "fetch worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let next = queue
                .lock()
                .expect("ticker queue lock is not poisoned")
                .pop_front();
            let Some(ticker) = next else {
                break;
            };

            let event = match self.resolve(&ticker, &cancel).await {
                Resolution::Done(outcome) => WorkerEvent::Resolved(outcome),
                Resolution::Exhausted(error) => WorkerEvent::PoolExhausted { ticker, error },
                Resolution::Cancelled => break,
            };
            let stop = matches!(event, WorkerEvent::PoolExhausted { .. });
            if sender.send(event).await.is_err() || stop {
                break;
            }
        }
        debug!(worker_id, "fetch worker stopped");
    }

    async fn resolve(&self, ticker: &Ticker, cancel: &CancellationToken) -> Resolution {
        let max_attempts = self.settings.max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self
                    .settings
                    .backoff
                    .delay(attempt - 1, self.failure_rate.current());
                tokio::select! {
                    _ = cancel.cancelled() => return Resolution::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let lease = match self.lease(cancel).await {
                Lease::Proxy(lease) => Some(lease),
                Lease::Direct => None,
                Lease::Exhausted(error) => return Resolution::Exhausted(error),
                Lease::Cancelled => return Resolution::Cancelled,
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Resolution::Cancelled,
                outcome = self.strategy.fetch(ticker, lease.as_ref()) => outcome,
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                FetchOutcome::Success { record, tier } => {
                    self.failure_rate.record(false);
                    if let Some(lease) = &lease {
                        self.pool.release(lease, ReleaseOutcome::Success);
                    }
                    FetchAttempt {
                        ticker: ticker.clone(),
                        attempt,
                        tier,
                        proxy: lease.as_ref().map(|lease| lease.display_address().to_owned()),
                        outcome: AttemptOutcome::Success,
                        latency_ms,
                        error: None,
                    }
                    .emit();
                    return Resolution::Done(TickerOutcome::Fetched {
                        record,
                        tier,
                        attempts: attempt,
                    });
                }
                FetchOutcome::Missing { tier, reason: error }
                | FetchOutcome::Transport { tier, error } => {
                    self.failure_rate.record(true);
                    let hard = error.failure_class().is_hard();
                    if let Some(lease) = &lease {
                        if hard {
                            self.pool.quarantine(lease, error.message());
                        } else {
                            self.pool.release(lease, ReleaseOutcome::SoftFailure);
                        }
                    }
                    FetchAttempt {
                        ticker: ticker.clone(),
                        attempt,
                        tier,
                        proxy: lease.as_ref().map(|lease| lease.display_address().to_owned()),
                        outcome: if hard {
                            AttemptOutcome::HardFailure
                        } else {
                            AttemptOutcome::SoftFailure
                        },
                        latency_ms,
                        error: Some(error.to_string()),
                    }
                    .emit();
                    last_error = Some(error);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| FetchError::validation("no fetch attempt was made"));
        info!(%ticker, attempts = max_attempts, error = %error, "ticker failed after retries");
        Resolution::Done(TickerOutcome::Failed {
            ticker: ticker.clone(),
            error,
            attempts: max_attempts,
        })
    }

    /// Leases a proxy, waiting out a fully quarantined pool when the earliest
    /// release is close enough.
    async fn lease(&self, cancel: &CancellationToken) -> Lease {
        loop {
            let error = match self.pool.acquire() {
                Ok(lease) => return Lease::Proxy(lease),
                Err(error) => error,
            };

            match error.retry_after() {
                Some(wait) if wait <= self.settings.max_exhausted_wait && !self.settings.allow_direct_fallback => {
                    debug!(wait_ms = wait.as_millis() as u64, "all proxies quarantined, waiting");
                    tokio::select! {
                        _ = cancel.cancelled() => return Lease::Cancelled,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                _ if self.settings.allow_direct_fallback => return Lease::Direct,
                _ => return Lease::Exhausted(error),
            }
        }
    }
}
