use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::endpoint::{ProxyEndpoint, ProxyHealth, ProxyLease, ReleaseOutcome};
use crate::FetchError;

/// Exponential quarantine cooldown: `base * 2^(n-1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuarantinePolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for QuarantinePolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(300),
            max: Duration::from_secs(900),
        }
    }
}

impl QuarantinePolicy {
    /// Cooldown after the `consecutive_failures`-th hard failure in a row.
    pub fn duration_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Pool tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyPoolConfig {
    pub quarantine: QuarantinePolicy,
    /// Idle time credited to endpoints whose last outcome was a success, so
    /// they are picked slightly ahead of equally idle endpoints.
    pub success_credit: Duration,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            quarantine: QuarantinePolicy::default(),
            success_credit: Duration::from_secs(1),
        }
    }
}

/// Read-only view of one endpoint for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxySnapshot {
    pub address: String,
    pub health: ProxyHealth,
    pub consecutive_hard_failures: u32,
    pub times_quarantined: u32,
    pub quarantined_for_ms: Option<u64>,
}

#[derive(Debug)]
struct PoolInner {
    endpoints: Vec<ProxyEndpoint>,
}

/// Thread-safe proxy pool with lazy quarantine expiry.
///
/// Every read and write goes through one mutex; callers only ever hold a
/// [`ProxyLease`].
#[derive(Debug)]
pub struct ProxyPool {
    config: ProxyPoolConfig,
    epoch: Instant,
    inner: Mutex<PoolInner>,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>, config: ProxyPoolConfig) -> Self {
        Self {
            config,
            epoch: Instant::now(),
            inner: Mutex::new(PoolInner { endpoints }),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), ProxyPoolConfig::default())
    }

    pub const fn config(&self) -> &ProxyPoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn acquire(&self) -> Result<ProxyLease, FetchError> {
        self.acquire_at(Instant::now())
    }

    /// Lease the least recently used selectable endpoint.
    ///
    /// Quarantines that have elapsed by `now` are lifted here.
    pub fn acquire_at(&self, now: Instant) -> Result<ProxyLease, FetchError> {
        let mut inner = self.lock();

        for endpoint in inner
            .endpoints
            .iter_mut()
            .filter(|endpoint| endpoint.health == ProxyHealth::Quarantined)
        {
            if endpoint.is_selectable_at(now) {
                endpoint.health = ProxyHealth::Active;
                endpoint.quarantine_until = None;
                debug!(proxy = %endpoint.display_address(), "proxy quarantine elapsed");
            }
        }

        let selected = inner
            .endpoints
            .iter()
            .enumerate()
            .filter(|(_, endpoint)| endpoint.health == ProxyHealth::Active)
            .min_by_key(|(id, endpoint)| (self.idle_key(endpoint), *id))
            .map(|(id, _)| id);

        match selected {
            Some(id) => {
                let endpoint = &mut inner.endpoints[id];
                endpoint.last_used_at = Some(now);
                Ok(ProxyLease::from_endpoint(id, endpoint))
            }
            None => {
                let retry_after = inner
                    .endpoints
                    .iter()
                    .filter(|endpoint| endpoint.health == ProxyHealth::Quarantined)
                    .filter_map(|endpoint| endpoint.quarantine_until)
                    .min()
                    .map(|until| until.saturating_duration_since(now));
                Err(FetchError::proxy_exhausted(retry_after))
            }
        }
    }

    pub fn release(&self, lease: &ProxyLease, outcome: ReleaseOutcome) {
        self.release_at(lease, outcome, Instant::now());
    }

    pub fn release_at(&self, lease: &ProxyLease, outcome: ReleaseOutcome, now: Instant) {
        let mut inner = self.lock();
        let Some(endpoint) = inner.endpoints.get_mut(lease.id) else {
            return;
        };

        endpoint.last_used_at = Some(now);
        endpoint.last_outcome = Some(outcome);
        if outcome == ReleaseOutcome::Success {
            endpoint.consecutive_hard_failures = 0;
        }
    }

    pub fn quarantine(&self, lease: &ProxyLease, reason: &str) -> Duration {
        self.quarantine_at(lease, reason, Instant::now())
    }

    /// Quarantine the leased endpoint and return the applied cooldown.
    ///
    /// Reports against an endpoint that is already quarantined count once,
    /// so concurrent workers hitting the same dead proxy do not escalate it.
    pub fn quarantine_at(&self, lease: &ProxyLease, reason: &str, now: Instant) -> Duration {
        let mut inner = self.lock();
        let Some(endpoint) = inner.endpoints.get_mut(lease.id) else {
            return Duration::ZERO;
        };

        match endpoint.health {
            ProxyHealth::Retired => return Duration::ZERO,
            ProxyHealth::Quarantined => {
                if let Some(until) = endpoint.quarantine_until.filter(|until| *until > now) {
                    return until.saturating_duration_since(now);
                }
            }
            ProxyHealth::Active => {}
        }

        endpoint.consecutive_hard_failures = endpoint.consecutive_hard_failures.saturating_add(1);
        let cooldown = self
            .config
            .quarantine
            .duration_for(endpoint.consecutive_hard_failures);
        endpoint.health = ProxyHealth::Quarantined;
        endpoint.quarantine_until = Some(now + cooldown);
        endpoint.last_quarantined_at = Some(now);
        endpoint.times_quarantined = endpoint.times_quarantined.saturating_add(1);

        warn!(
            proxy = %endpoint.display_address(),
            consecutive_hard_failures = endpoint.consecutive_hard_failures,
            cooldown_ms = cooldown.as_millis() as u64,
            reason,
            "proxy quarantined"
        );
        cooldown
    }

    /// Permanently remove the endpoint from selection.
    pub fn retire(&self, lease: &ProxyLease) {
        let mut inner = self.lock();
        if let Some(endpoint) = inner.endpoints.get_mut(lease.id) {
            endpoint.health = ProxyHealth::Retired;
            endpoint.quarantine_until = None;
            info!(proxy = %endpoint.display_address(), "proxy retired");
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count_at(Instant::now())
    }

    /// Endpoints that are neither retired nor quarantined as of `now`.
    pub fn active_count_at(&self, now: Instant) -> usize {
        self.lock()
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.is_selectable_at(now))
            .count()
    }

    /// Distinct endpoints quarantined at or after `since`.
    pub fn quarantined_since(&self, since: Instant) -> usize {
        self.lock()
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.last_quarantined_at.is_some_and(|at| at >= since))
            .count()
    }

    pub fn snapshot(&self) -> Vec<ProxySnapshot> {
        let now = Instant::now();
        self.lock()
            .endpoints
            .iter()
            .map(|endpoint| ProxySnapshot {
                address: endpoint.display_address(),
                health: if endpoint.health == ProxyHealth::Quarantined && endpoint.is_selectable_at(now) {
                    ProxyHealth::Active
                } else {
                    endpoint.health
                },
                consecutive_hard_failures: endpoint.consecutive_hard_failures,
                times_quarantined: endpoint.times_quarantined,
                quarantined_for_ms: endpoint
                    .quarantine_until
                    .filter(|until| *until > now)
                    .map(|until| until.saturating_duration_since(now).as_millis() as u64),
            })
            .collect()
    }

    /// Never-used endpoints sort first, then the longest idle.
    fn idle_key(&self, endpoint: &ProxyEndpoint) -> Option<Duration> {
        endpoint.last_used_at.map(|used| {
            let since_epoch = used.saturating_duration_since(self.epoch);
            if endpoint.last_outcome == Some(ReleaseOutcome::Success) {
                since_epoch.saturating_sub(self.config.success_credit)
            } else {
                since_epoch
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner.lock().expect("proxy pool lock is not poisoned")
    }
}
