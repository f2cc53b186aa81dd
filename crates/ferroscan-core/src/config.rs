//! Scanner configuration.
//!
//! [`ScannerConfig`] is built once per pass and never mutated while a scan is
//! running. It can be assembled three ways, typically layered in this order:
//!
//! 1. [`ScannerConfig::default`]
//! 2. a JSON file ([`ScannerConfig::from_json_file`])
//! 3. `FERROSCAN_*` environment variables ([`ScannerConfig::from_env`])
//!
//! Callers then apply explicit overrides with the `with_*` methods and call
//! [`ScannerConfig::validate`].
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FERROSCAN_WORKERS` | `worker_count` |
//! | `FERROSCAN_TIMEOUT_MS` | `per_request_timeout` |
//! | `FERROSCAN_MAX_RETRIES` | `max_retries` |
//! | `FERROSCAN_BATCH_SIZE` | `batch_size` |
//! | `FERROSCAN_PROXY_FILE` | `proxy_source` |
//! | `FERROSCAN_QUARANTINE_BASE_SECS` | `quarantine_base_duration` |
//! | `FERROSCAN_QUARANTINE_MAX_SECS` | `quarantine_max_duration` |
//! | `FERROSCAN_MAX_EXHAUSTED_WAIT_MS` | `max_exhausted_wait` |
//! | `FERROSCAN_DEADLINE_SECS` | `deadline` |
//! | `FERROSCAN_MAX_TICKERS` | `max_tickers` |
//! | `FERROSCAN_MAX_RPS` | `max_requests_per_second` |
//! | `FERROSCAN_DIRECT_FALLBACK` | `allow_direct_fallback` |
//! | `FERROSCAN_DRY_RUN` | `dry_run` |

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::proxy::{load_proxy_file, parse_proxy_list, ProxyEndpoint, ProxyPoolConfig, QuarantinePolicy};
use crate::retry::Backoff;
use crate::ConfigError;

/// Where the proxy list comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxySource {
    /// No proxies; only useful with direct fallback.
    #[default]
    None,
    /// JSON or newline-delimited list on disk.
    File(PathBuf),
    /// Addresses given inline.
    List(Vec<String>),
}

impl ProxySource {
    pub fn load(&self) -> Result<Vec<ProxyEndpoint>, ConfigError> {
        match self {
            Self::None => Ok(Vec::new()),
            Self::File(path) => load_proxy_file(path),
            Self::List(addresses) => parse_proxy_list(&addresses.join("\n")),
        }
    }
}

/// Immutable configuration for one scan pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    /// Concurrent fetch workers.
    pub worker_count: usize,
    /// Upper bound on each tier call.
    pub per_request_timeout: Duration,
    /// Retries per ticker after the first attempt.
    pub max_retries: u32,
    /// Progress-log interval and persistence chunk size.
    pub batch_size: usize,
    pub proxy_source: ProxySource,
    pub quarantine_base_duration: Duration,
    pub quarantine_max_duration: Duration,
    /// Longest wait for a fully quarantined pool to release an endpoint.
    /// A longer earliest release ends the pass as degraded.
    pub max_exhausted_wait: Duration,
    /// Wall-clock budget for the whole pass.
    pub deadline: Duration,
    /// Cap applied by backfill selection.
    pub max_tickers: i64,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub failure_rate_weight: f64,
    pub success_credit: Duration,
    /// Upstream calls per second across all workers, counting every tier
    /// call; `None` disables throttling.
    pub max_requests_per_second: Option<u32>,
    /// Fetch without a proxy once the pool has nothing left to lease.
    pub allow_direct_fallback: bool,
    /// Skip persistence.
    pub dry_run: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            per_request_timeout: Duration::from_secs(10),
            max_retries: 3,
            batch_size: 100,
            proxy_source: ProxySource::None,
            quarantine_base_duration: Duration::from_secs(300),
            quarantine_max_duration: Duration::from_secs(900),
            max_exhausted_wait: Duration::from_secs(5),
            deadline: Duration::from_secs(1_800),
            max_tickers: 10_000,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(5),
            failure_rate_weight: 2.0,
            success_credit: Duration::from_secs(1),
            max_requests_per_second: None,
            allow_direct_fallback: false,
            dry_run: false,
        }
    }
}

impl ScannerConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_per_request_timeout(mut self, timeout: Duration) -> Self {
        self.per_request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_proxy_source(mut self, proxy_source: ProxySource) -> Self {
        self.proxy_source = proxy_source;
        self
    }

    pub fn with_quarantine(mut self, base: Duration, max: Duration) -> Self {
        self.quarantine_base_duration = base;
        self.quarantine_max_duration = max;
        self
    }

    pub fn with_max_exhausted_wait(mut self, wait: Duration) -> Self {
        self.max_exhausted_wait = wait;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_tickers(mut self, max_tickers: i64) -> Self {
        self.max_tickers = max_tickers;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_failure_rate_weight(mut self, weight: f64) -> Self {
        self.failure_rate_weight = weight;
        self
    }

    pub fn with_success_credit(mut self, credit: Duration) -> Self {
        self.success_credit = credit;
        self
    }

    pub fn with_max_requests_per_second(mut self, limit: Option<u32>) -> Self {
        self.max_requests_per_second = limit;
        self
    }

    pub fn with_direct_fallback(mut self, allow: bool) -> Self {
        self.allow_direct_fallback = allow;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> Result<(), ConfigError> {
            Err(ConfigError::InvalidValue {
                field,
                reason: reason.to_owned(),
            })
        }

        if self.worker_count == 0 {
            return invalid("worker_count", "must be at least 1");
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "must be at least 1");
        }
        if self.per_request_timeout.is_zero() {
            return invalid("per_request_timeout", "must be greater than zero");
        }
        if self.deadline.is_zero() {
            return invalid("deadline", "must be greater than zero");
        }
        if self.quarantine_base_duration.is_zero() {
            return invalid("quarantine_base_duration", "must be greater than zero");
        }
        if self.quarantine_max_duration < self.quarantine_base_duration {
            return invalid(
                "quarantine_max_duration",
                "must not be shorter than quarantine_base_duration",
            );
        }
        if self.backoff_max < self.backoff_base {
            return invalid("backoff_max", "must not be shorter than backoff_base");
        }
        if !self.failure_rate_weight.is_finite() || self.failure_rate_weight < 0.0 {
            return invalid("failure_rate_weight", "must be a finite, non-negative number");
        }
        if self.max_requests_per_second == Some(0) {
            return invalid("max_requests_per_second", "must be at least 1 when set");
        }
        Ok(())
    }

    pub fn pool_config(&self) -> ProxyPoolConfig {
        ProxyPoolConfig {
            quarantine: QuarantinePolicy {
                base: self.quarantine_base_duration,
                max: self.quarantine_max_duration,
            },
            success_credit: self.success_credit,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: self.backoff_base,
            max: self.backoff_max,
            failure_rate_weight: self.failure_rate_weight,
            jitter: true,
        }
    }

    /// Defaults overlaid with `FERROSCAN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay_env(|name| env::var(name).ok())
    }

    /// Overlays variables resolved by `lookup` onto `self`.
    pub fn overlay_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = read("FERROSCAN_WORKERS") {
            self.worker_count = parse_env("FERROSCAN_WORKERS", &value)?;
        }
        if let Some(value) = read("FERROSCAN_TIMEOUT_MS") {
            self.per_request_timeout =
                Duration::from_millis(parse_env("FERROSCAN_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = read("FERROSCAN_MAX_RETRIES") {
            self.max_retries = parse_env("FERROSCAN_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read("FERROSCAN_BATCH_SIZE") {
            self.batch_size = parse_env("FERROSCAN_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read("FERROSCAN_PROXY_FILE") {
            self.proxy_source = ProxySource::File(PathBuf::from(value.trim()));
        }
        if let Some(value) = read("FERROSCAN_QUARANTINE_BASE_SECS") {
            self.quarantine_base_duration =
                Duration::from_secs(parse_env("FERROSCAN_QUARANTINE_BASE_SECS", &value)?);
        }
        if let Some(value) = read("FERROSCAN_QUARANTINE_MAX_SECS") {
            self.quarantine_max_duration =
                Duration::from_secs(parse_env("FERROSCAN_QUARANTINE_MAX_SECS", &value)?);
        }
        if let Some(value) = read("FERROSCAN_MAX_EXHAUSTED_WAIT_MS") {
            self.max_exhausted_wait =
                Duration::from_millis(parse_env("FERROSCAN_MAX_EXHAUSTED_WAIT_MS", &value)?);
        }
        if let Some(value) = read("FERROSCAN_DEADLINE_SECS") {
            self.deadline = Duration::from_secs(parse_env("FERROSCAN_DEADLINE_SECS", &value)?);
        }
        if let Some(value) = read("FERROSCAN_MAX_TICKERS") {
            self.max_tickers = parse_env("FERROSCAN_MAX_TICKERS", &value)?;
        }
        if let Some(value) = read("FERROSCAN_MAX_RPS") {
            self.max_requests_per_second = Some(parse_env("FERROSCAN_MAX_RPS", &value)?);
        }
        if let Some(value) = read("FERROSCAN_DIRECT_FALLBACK") {
            self.allow_direct_fallback = parse_flag("FERROSCAN_DIRECT_FALLBACK", &value)?;
        }
        if let Some(value) = read("FERROSCAN_DRY_RUN") {
            self.dry_run = parse_flag("FERROSCAN_DRY_RUN", &value)?;
        }
        Ok(self)
    }

    /// Defaults overlaid with a JSON file. Durations are given as `*_ms` or
    /// `*_secs` fields; unknown keys are rejected.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_json::from_str(text)?;
        Ok(file.apply(Self::default()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    worker_count: Option<usize>,
    per_request_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    batch_size: Option<usize>,
    proxy_file: Option<PathBuf>,
    proxies: Option<Vec<String>>,
    quarantine_base_secs: Option<u64>,
    quarantine_max_secs: Option<u64>,
    max_exhausted_wait_ms: Option<u64>,
    deadline_secs: Option<u64>,
    max_tickers: Option<i64>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    failure_rate_weight: Option<f64>,
    success_credit_ms: Option<u64>,
    max_requests_per_second: Option<u32>,
    allow_direct_fallback: Option<bool>,
    dry_run: Option<bool>,
}

impl FileConfig {
    fn apply(self, mut config: ScannerConfig) -> ScannerConfig {
        let millis = Duration::from_millis;
        let secs = Duration::from_secs;

        if let Some(value) = self.worker_count {
            config.worker_count = value;
        }
        if let Some(value) = self.per_request_timeout_ms {
            config.per_request_timeout = millis(value);
        }
        if let Some(value) = self.max_retries {
            config.max_retries = value;
        }
        if let Some(value) = self.batch_size {
            config.batch_size = value;
        }
        if let Some(addresses) = self.proxies {
            config.proxy_source = ProxySource::List(addresses);
        }
        if let Some(path) = self.proxy_file {
            config.proxy_source = ProxySource::File(path);
        }
        if let Some(value) = self.quarantine_base_secs {
            config.quarantine_base_duration = secs(value);
        }
        if let Some(value) = self.quarantine_max_secs {
            config.quarantine_max_duration = secs(value);
        }
        if let Some(value) = self.max_exhausted_wait_ms {
            config.max_exhausted_wait = millis(value);
        }
        if let Some(value) = self.deadline_secs {
            config.deadline = secs(value);
        }
        if let Some(value) = self.max_tickers {
            config.max_tickers = value;
        }
        if let Some(value) = self.backoff_base_ms {
            config.backoff_base = millis(value);
        }
        if let Some(value) = self.backoff_max_ms {
            config.backoff_max = millis(value);
        }
        if let Some(value) = self.failure_rate_weight {
            config.failure_rate_weight = value;
        }
        if let Some(value) = self.success_credit_ms {
            config.success_credit = millis(value);
        }
        if self.max_requests_per_second.is_some() {
            config.max_requests_per_second = self.max_requests_per_second;
        }
        if let Some(value) = self.allow_direct_fallback {
            config.allow_direct_fallback = value;
        }
        if let Some(value) = self.dry_run {
            config.dry_run = value;
        }
        config
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name: name.to_owned(),
            value: value.to_owned(),
        }),
    }
}
