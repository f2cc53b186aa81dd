use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FetchError, QuoteRecord, Ticker, Tier, UtcDateTime};

/// Lifecycle of a scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Running,
    /// Every ticker resolved before the deadline.
    Completed,
    /// Deadline elapsed or the pass was cancelled externally.
    Cancelled,
    /// The proxy pool ran dry with no direct fallback configured.
    Degraded,
}

impl ScanState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Degraded => "degraded",
        }
    }
}

impl Display for ScanState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one pass produced. Built once by the orchestrator.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub status: ScanState,
    pub started_at: UtcDateTime,
    pub total_symbols: usize,
    pub records: Vec<QuoteRecord>,
    /// Last error per ticker that exhausted its retries.
    pub failures: BTreeMap<Ticker, FetchError>,
    /// Tickers never resolved because the pass stopped early.
    pub skipped: Vec<Ticker>,
    pub duration: Duration,
    pub per_tier_counts: BTreeMap<Tier, usize>,
    pub quarantined_proxy_count: usize,
    pub persisted_count: usize,
    /// Why the pass stopped early, if it did.
    pub error: Option<FetchError>,
}

impl ScanResult {
    pub fn real_data_count(&self) -> usize {
        self.records.len()
    }

    /// Failed plus skipped tickers.
    pub fn failed_count(&self) -> usize {
        self.failures.len() + self.skipped.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// `records / total_symbols`; `0.0` for an empty pass.
    pub fn success_rate(&self) -> f64 {
        if self.total_symbols == 0 {
            return 0.0;
        }
        (self.records.len() as f64 / self.total_symbols as f64).clamp(0.0, 1.0)
    }

    /// Resolved tickers (records plus failures) per second of wall time.
    pub fn rate_per_second(&self) -> f64 {
        let seconds = self.duration.as_secs_f64();
        if seconds <= f64::EPSILON {
            return 0.0;
        }
        (self.records.len() + self.failures.len()) as f64 / seconds
    }

    pub fn summary(&self) -> ScanSummary {
        let per_tier_counts = Tier::ALL
            .iter()
            .map(|tier| {
                (
                    tier.as_str().to_owned(),
                    self.per_tier_counts.get(tier).copied().unwrap_or(0),
                )
            })
            .collect();

        ScanSummary {
            scan_id: self.scan_id.to_string(),
            status: self.status,
            started_at: self.started_at,
            total_symbols: self.total_symbols,
            real_data_count: self.real_data_count(),
            failed_count: self.failed_count(),
            skipped_count: self.skipped_count(),
            success_percentage: round2(self.success_rate() * 100.0),
            duration_seconds: round2(self.duration.as_secs_f64()),
            rate_per_second: round2(self.rate_per_second()),
            per_tier_counts,
            quarantined_proxy_count: self.quarantined_proxy_count,
            persisted_count: self.persisted_count,
            error: self.error.as_ref().map(|error| error.code().to_owned()),
        }
    }
}

/// Flat, serializable report of a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scan_id: String,
    pub status: ScanState,
    pub started_at: UtcDateTime,
    pub total_symbols: usize,
    pub real_data_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub success_percentage: f64,
    pub duration_seconds: f64,
    pub rate_per_second: f64,
    pub per_tier_counts: BTreeMap<String, usize>,
    pub quarantined_proxy_count: usize,
    pub persisted_count: usize,
    pub error: Option<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
