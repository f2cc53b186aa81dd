//! Priority-ordered work list selection for a scan pass.

use std::collections::HashSet;

use crate::Ticker;

/// Work list plus the bookkeeping behind it, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillPlan {
    pub tickers: Vec<Ticker>,
    pub hot_selected: usize,
    pub stale_selected: usize,
    pub duplicates_dropped: usize,
    pub invalid_dropped: usize,
    pub truncated: usize,
}

/// Merge hot and stale tickers into a deduplicated, budget-capped list.
///
/// Hot tickers always precede stale ones and order within each group is
/// preserved. A non-positive `max_tickers` yields an empty list. Blank entries
/// are skipped; entries that fail [`Ticker::parse`] are dropped as well and
/// counted in [`BackfillPlan::invalid_dropped`] by [`plan_backfill`].
pub fn choose_backfill_tickers<H, S>(hot: &[H], stale: &[S], max_tickers: i64) -> Vec<Ticker>
where
    H: AsRef<str>,
    S: AsRef<str>,
{
    plan_backfill(hot, stale, max_tickers).tickers
}

pub fn plan_backfill<H, S>(hot: &[H], stale: &[S], max_tickers: i64) -> BackfillPlan
where
    H: AsRef<str>,
    S: AsRef<str>,
{
    let mut plan = BackfillPlan::default();
    let Ok(budget) = usize::try_from(max_tickers) else {
        return plan;
    };
    if budget == 0 {
        return plan;
    }

    let mut seen = HashSet::new();
    let candidates = hot
        .iter()
        .map(|raw| (raw.as_ref(), true))
        .chain(stale.iter().map(|raw| (raw.as_ref(), false)));

    for (raw, is_hot) in candidates {
        if raw.trim().is_empty() {
            continue;
        }
        let Ok(ticker) = Ticker::parse(raw) else {
            plan.invalid_dropped += 1;
            continue;
        };
        if !seen.insert(ticker.clone()) {
            plan.duplicates_dropped += 1;
            continue;
        }
        if plan.tickers.len() >= budget {
            plan.truncated += 1;
            continue;
        }

        if is_hot {
            plan.hot_selected += 1;
        } else {
            plan.stale_selected += 1;
        }
        plan.tickers.push(ticker);
    }

    plan
}
