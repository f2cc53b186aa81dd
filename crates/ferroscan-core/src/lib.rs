//! # Ferroscan Core
//!
//! Concurrent, proxy-rotating market-data scan engine.
//!
//! ## Overview
//!
//! This crate provides the building blocks of one scan pass:
//!
//! - **Backfill selection** that puts hot tickers ahead of stale ones under a budget
//! - **Proxy pool** with exponential quarantine and lazy expiry
//! - **Error classification** into hard (quarantine) and soft (retry) failures
//! - **Tiered fetching** from light summary quotes down to historical bars
//! - **Fetch workers** with adaptive backoff and a shared request throttle
//! - **Orchestrator** that enforces the deadline and aggregates a result
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backfill`] | Hot/stale work list selection |
//! | [`classifier`] | Hard/soft failure classification |
//! | [`config`] | Scanner configuration (defaults, env, JSON) |
//! | [`domain`] | Domain models (Ticker, QuoteRecord, Tier) |
//! | [`error`] | Core error types |
//! | [`fetch`] | Tier strategy, HTTP seam and upstream fetcher |
//! | [`orchestrator`] | Scan pass state machine |
//! | [`proxy`] | Proxy endpoints, pool and list loading |
//! | [`result`] | Scan result and flat summary |
//! | [`retry`] | Backoff and failure-rate tracking |
//! | [`sink`] | Record persistence boundary |
//! | [`throttle`] | Global request throttle |
//! | [`worker`] | Fetch worker pool |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferroscan_core::{ScanOrchestrator, ScannerConfig, YahooTierFetcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScannerConfig::from_env()?;
//!     let orchestrator = ScanOrchestrator::new(config, Arc::new(YahooTierFetcher::default()))?;
//!
//!     let result = orchestrator.run_backfill(&["AAPL", "MSFT"], &["TSLA"]).await;
//!     println!("{}", serde_json::to_string(&result.summary())?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ plan_backfill   │
//! └────────┬────────┘
//!          │ ordered tickers
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ScanOrchestrator│◀────│ mpsc: outcomes   │
//! └────────┬────────┘     └────────▲─────────┘
//!          │                       │
//!          ▼                       │
//! ┌─────────────────┐     ┌──────────────────┐
//! │ FetchWorkerPool │────▶│ ProxyPool        │
//! │ (W tasks)       │     │ (one mutex)      │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ TieredFetch     │────▶│ TierFetcher      │
//! │ Strategy        │     │ (HTTP via proxy) │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Per-ticker failures never abort a pass. They surface as [`FetchError`]s
//! whose kind decides what the worker does next:
//!
//! ```rust
//! use ferroscan_core::{FetchError, FetchErrorKind};
//!
//! fn next_step(error: &FetchError) -> &'static str {
//!     match error.kind() {
//!         FetchErrorKind::Transport => "quarantine proxy and retry",
//!         FetchErrorKind::RateLimited => "back off and retry",
//!         FetchErrorKind::Validation => "escalate tier",
//!         FetchErrorKind::ProxyExhausted => "fall back or degrade",
//!         FetchErrorKind::DeadlineExceeded => "cancel",
//!     }
//! }
//! ```

pub mod backfill;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod proxy;
pub mod result;
pub mod retry;
pub mod sink;
pub mod throttle;
pub mod worker;

// Re-export commonly used types at crate root for convenience

// Selection and classification
pub use backfill::{choose_backfill_tickers, plan_backfill, BackfillPlan};
pub use classifier::{classify, FailureClass};

// Configuration
pub use config::{ProxySource, ScannerConfig};

// Domain models
pub use domain::{QuoteFields, QuoteRecord, Ticker, Tier, UtcDateTime};

// Error types
pub use error::{ConfigError, FetchError, FetchErrorKind, PersistError, ValidationError};

// Fetching
pub use fetch::{
    FetchOutcome, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, TierFetcher,
    TierFuture, TieredFetchStrategy, YahooTierFetcher,
};

// Orchestration
pub use orchestrator::ScanOrchestrator;
pub use result::{ScanResult, ScanState, ScanSummary};

// Proxy pool
pub use proxy::{
    load_proxy_file, parse_proxy_list, ProxyEndpoint, ProxyHealth, ProxyLease, ProxyPool,
    ProxyPoolConfig, ProxyProtocol, ProxySnapshot, QuarantinePolicy, ReleaseOutcome,
};

// Retry, throttling and workers
pub use retry::{Backoff, FailureRate};
pub use throttle::RequestThrottle;
pub use worker::{
    AttemptOutcome, FetchAttempt, FetchWorkerPool, TickerOutcome, WorkerEvent, WorkerRun,
    WorkerSettings,
};

// Persistence
pub use sink::{JsonLinesSink, RecordSink};
