//! Offer ranking and snapshot assembly
//!
//! One comparator drives the `allProducts` ordering and every
//! best-of view, so ties resolve identically everywhere regardless
//! of collector completion order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::Utc;

use crate::schema::{FetchOutcome, FetchStats, Offer, Snapshot};

/// Deterministic ranking: higher apy first, then shorter duration,
/// then exchange id, then product id.
///
/// The duration leg means that of two equal rates the one locking
/// funds for less time wins; the remaining legs only pin down a
/// stable order for true duplicates.
pub fn rank_cmp(a: &Offer, b: &Offer) -> Ordering {
    b.apy
        .partial_cmp(&a.apy)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.duration_days.cmp(&b.duration_days))
        .then_with(|| a.exchange.cmp(&b.exchange))
        .then_with(|| a.product_id.cmp(&b.product_id))
}

/// Assembles the immutable snapshot of one refresh cycle.
///
/// INPUTS:
/// - `offers`: normalized offers of the cycle (any order)
/// - `outcomes`: one entry per collector that ran, for statistics
/// - `reference_price`: last known spot, if any
/// - `buckets`: configured whole-day buckets for the duration view
///
/// NOTES:
/// - Buckets nobody filled are absent from the map, never null
/// - An empty offer set still yields a valid snapshot with
///   `bestOverall` null and correct per-collector statistics
///
pub fn build_snapshot(
    mut offers: Vec<Offer>,
    outcomes: &[FetchOutcome],
    reference_price: Option<f64>,
    buckets: &[i64],
) -> Snapshot {
    offers.sort_by(rank_cmp);

    let best_overall = offers.first().cloned();

    // Sorted input makes the first hit per key the best one
    let mut best_by_duration = BTreeMap::new();
    for &days in buckets {
        if let Some(offer) = offers.iter().find(|o| o.duration_days == days) {
            best_by_duration.insert(format!("{}d", days), offer.clone());
        }
    }

    let mut best_by_exchange: BTreeMap<String, Offer> = BTreeMap::new();
    for offer in &offers {
        best_by_exchange
            .entry(offer.exchange.clone())
            .or_insert_with(|| offer.clone());
    }

    let successful = outcomes.iter().filter(|o| o.success).count();
    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.success)
        .map(|o| o.exchange.clone())
        .collect();
    let total = offers.len();

    Snapshot {
        last_updated: Utc::now(),
        btc_price: reference_price.unwrap_or(0.0),
        best_overall,
        best_by_duration,
        best_by_exchange,
        all_products: offers,
        fetch_stats: FetchStats {
            total,
            successful,
            failed,
        },
    }
}
