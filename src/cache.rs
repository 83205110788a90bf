//! Snapshot cache and refresh scheduling
//!
//! The cache is the only hand-off point between the background
//! refresh loop and the HTTP layer. Publication is one atomic
//! pointer swap; requests never wait on a running cycle and a
//! running cycle never blocks requests.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::Notify;

use crate::config::Config;
use crate::exchanges::{self, CollectorContext};
use crate::metrics::METRICS;
use crate::normalize;
use crate::orchestrator;
use crate::price;
use crate::rank;
use crate::schema::{FetchOutcome, Snapshot};

/// Lock-free holder of the latest published snapshot.
pub struct SnapshotCache {
    current: ArcSwapOption<Snapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        SnapshotCache {
            current: ArcSwapOption::from(None),
        }
    }

    /// Latest published snapshot; `None` until the first successful
    /// cycle completes.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        self.current.store(Some(Arc::new(snapshot)));
        METRICS.snapshots_published.fetch_add(1, Ordering::Relaxed);
    }
}

/// Publish policy: a cycle becomes visible only when at least one
/// collector delivered. On a total failure the previous snapshot
/// stays up, so consumers see stale-but-real data instead of an
/// empty shell.
pub fn should_publish(outcomes: &[FetchOutcome]) -> bool {
    outcomes.iter().any(|o| o.success)
}

/// One refresh cycle end to end: build collectors, fetch, normalize,
/// rank, publish.
pub async fn run_cycle(config: &Config, ctx: &CollectorContext, cache: &SnapshotCache) {
    let collectors = exchanges::build_collectors(config, ctx);
    let configured = collectors.len();

    // Offers only carry a price observed in their own cycle; the
    // snapshot's headline price falls back to the last known value
    // when every source is down.
    let live_price = price::fetch_reference_price(&ctx.http, &config.assets).await;
    let snapshot_price =
        live_price.or_else(|| cache.current().map(|s| s.btc_price).filter(|p| *p > 0.0));

    let outcomes = orchestrator::fetch_all(collectors).await;

    if !should_publish(&outcomes) {
        METRICS.cycles_failed.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "[scheduler] all {} collectors failed; keeping previous snapshot",
            configured
        );
        return;
    }

    let offers = normalize::normalize(&outcomes, live_price, &config.assets);
    let snapshot = rank::build_snapshot(offers, &outcomes, snapshot_price, &config.duration_buckets);

    log::info!(
        "[scheduler] publishing snapshot: {} offers, best {}",
        snapshot.fetch_stats.total,
        snapshot
            .best_overall
            .as_ref()
            .map(|o| format!("{} at {:.2}%", o.exchange, o.apy))
            .unwrap_or_else(|| "none".to_string())
    );

    cache.publish(snapshot);
    METRICS.cycles_completed.fetch_add(1, Ordering::Relaxed);
}

/// Runs refresh cycles forever: one immediately on startup, then one
/// per interval, with manual kicks waking the loop early.
pub async fn run_scheduler(
    config: Arc<Config>,
    ctx: CollectorContext,
    cache: Arc<SnapshotCache>,
    refresh: Arc<Notify>,
) {
    let interval = Duration::from_secs(config.refresh.interval_secs);
    log::info!(
        "[scheduler] starting with a {}s interval",
        interval.as_secs()
    );

    loop {
        run_cycle(&config, &ctx, &cache).await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = refresh.notified() => {
                METRICS.refresh_kicks.fetch_add(1, Ordering::Relaxed);
                log::info!("[scheduler] manual refresh requested");
            }
        }
    }
}
