//! Property tests for backfill selection and error classification.
//!
//! Uses proptest to verify:
//! 1. Selection matches an order-preserving, deduplicated, budget-capped merge
//! 2. Hot tickers never follow stale-only tickers
//! 3. A non-positive budget always selects nothing
//! 4. Classification ignores case and surrounding whitespace

use std::collections::HashSet;

use ferroscan_core::{choose_backfill_tickers, classify, plan_backfill, FailureClass};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────

/// Symbols with mixed case and occasional padding, so normalization collides.
fn arb_symbol() -> impl Strategy<Value = String> {
    ("[A-Da-d]{1,3}", prop::bool::ANY).prop_map(|(symbol, padded)| {
        if padded {
            format!("  {symbol} ")
        } else {
            symbol
        }
    })
}

fn arb_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_symbol(), 0..24)
}

fn reference_selection(hot: &[String], stale: &[String], max_tickers: i64) -> Vec<String> {
    let budget = usize::try_from(max_tickers).unwrap_or(0);
    let mut seen = HashSet::new();
    hot.iter()
        .chain(stale)
        .map(|raw| raw.trim().to_ascii_uppercase())
        .filter(|symbol| seen.insert(symbol.clone()))
        .take(budget)
        .collect()
}

// ── 1. Reference Model ──────────────────────────────────────────────

proptest! {
    #[test]
    fn selection_matches_reference_merge(
        hot in arb_list(),
        stale in arb_list(),
        max_tickers in -3_i64..40,
    ) {
        let selected: Vec<String> = choose_backfill_tickers(&hot, &stale, max_tickers)
            .iter()
            .map(|ticker| ticker.as_str().to_owned())
            .collect();

        prop_assert_eq!(selected, reference_selection(&hot, &stale, max_tickers));
    }

    #[test]
    fn plan_accounts_for_every_candidate(
        hot in arb_list(),
        stale in arb_list(),
        max_tickers in 1_i64..40,
    ) {
        let plan = plan_backfill(&hot, &stale, max_tickers);

        prop_assert_eq!(plan.hot_selected + plan.stale_selected, plan.tickers.len());
        prop_assert_eq!(
            plan.tickers.len() + plan.duplicates_dropped + plan.truncated + plan.invalid_dropped,
            hot.len() + stale.len()
        );
    }
}

// ── 2. Priority ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn hot_tickers_precede_stale_only_tickers(
        hot in arb_list(),
        stale in arb_list(),
        max_tickers in 1_i64..40,
    ) {
        let hot_set: HashSet<String> = hot.iter().map(|raw| raw.trim().to_ascii_uppercase()).collect();
        let selected = choose_backfill_tickers(&hot, &stale, max_tickers);

        let first_stale = selected
            .iter()
            .position(|ticker| !hot_set.contains(ticker.as_str()))
            .unwrap_or(selected.len());
        prop_assert!(selected[first_stale..]
            .iter()
            .all(|ticker| !hot_set.contains(ticker.as_str())));
    }
}

// ── 3. Budget ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn non_positive_budget_selects_nothing(
        hot in arb_list(),
        stale in arb_list(),
        max_tickers in i64::MIN..=0,
    ) {
        prop_assert!(choose_backfill_tickers(&hot, &stale, max_tickers).is_empty());
    }
}

// ── 4. Classification ───────────────────────────────────────────────

proptest! {
    #[test]
    fn classification_ignores_case_and_padding(
        marker in prop::sample::select(vec![
            "Connection refused",
            "CONNECT tunnel failed, response 407",
            "Proxy Authentication Required",
            "operation timed out",
        ]),
        padding in "[ \t]{0,3}",
    ) {
        let padded = format!("{padding}{marker}{padding}");
        prop_assert_eq!(classify(Some(padded.as_str())), FailureClass::Hard);
        prop_assert_eq!(classify(Some(padded.to_ascii_uppercase().as_str())), FailureClass::Hard);
    }

    #[test]
    fn blank_input_is_soft(padding in "[ \t\n]{0,6}") {
        prop_assert_eq!(classify(Some(padding.as_str())), FailureClass::Soft);
    }
}
