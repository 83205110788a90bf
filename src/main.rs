// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:       Configuration structs loaded from JSON
// - schema:       Canonical offer model and snapshot types
// - util:         Shared helper utilities (time, signing)
// - error:        Collector error taxonomy
// - browser:      Headless browser capability interface
// - exchanges:    Offer collectors and the collector registry
// - orchestrator: One concurrent collection cycle with budgets
// - normalize:    Raw offer validation and canonicalization
// - rank:         Offer ordering and snapshot assembly
// - price:        Reference spot price sources
// - cache:        Snapshot cache and refresh scheduling
// - server:       HTTP read surface
// - metrics:      Process-wide runtime counters
//
mod browser;
mod cache;
mod config;
mod error;
mod exchanges;
mod metrics;
mod normalize;
mod orchestrator;
mod price;
mod rank;
mod schema;
mod server;
mod util;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep;

use browser::chromium::ChromiumLauncher;
use cache::SnapshotCache;
use config::Config;
use exchanges::CollectorContext;
use metrics::METRICS;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// This is the main runtime for the dual-investment offer
// aggregator.
//
// Responsibilities:
// - Load configuration and credentials
// - Build the shared collection context (HTTP client, browser
//   launcher)
// - Run the refresh scheduler in the background
// - Serve the latest snapshot over HTTP
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --------------------------------------------------------
    // Environment and logging
    //
    // NOTE:
    // - .env is optional; deployments can pass credentials
    //   through the environment directly.
    // - RUST_LOG overrides the default "info" filter.
    // --------------------------------------------------------
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config_path, once) = parse_args();
    let config = Arc::new(Config::load(&config_path)?);

    log::info!(
        "[main] {} of {} configured exchanges enabled",
        config.enabled_exchanges(),
        config.exchanges.len()
    );

    // --------------------------------------------------------
    // Shared collection context
    //
    // One HTTP client serves every REST collector and price
    // source; the launcher hands out a fresh browser session per
    // scrape. Collectors themselves are rebuilt every cycle.
    // --------------------------------------------------------
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let ctx = CollectorContext {
        http,
        launcher: Arc::new(ChromiumLauncher),
    };

    let cache = Arc::new(SnapshotCache::new());

    // --------------------------------------------------------
    // One-shot mode
    //
    // `--once` runs a single collection cycle, prints the
    // snapshot to stdout and exits. Useful for checking
    // credentials and page selectors without standing up the
    // server.
    // --------------------------------------------------------
    if once {
        cache::run_cycle(&config, &ctx, &cache).await;
        let Some(snapshot) = cache.current() else {
            anyhow::bail!("no snapshot produced: every collector failed");
        };
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        return Ok(());
    }

    // --------------------------------------------------------
    // Metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    tokio::spawn(async {
        loop {
            sleep(Duration::from_secs(60)).await;

            log::info!(
                "[METRICS] cycles={} failed_cycles={} published={} collectors_ok={} collectors_err={} offers={} dropped={} http_reqs={} kicks={}",
                METRICS.cycles_completed.load(Ordering::Relaxed),
                METRICS.cycles_failed.load(Ordering::Relaxed),
                METRICS.snapshots_published.load(Ordering::Relaxed),
                METRICS.collectors_succeeded.load(Ordering::Relaxed),
                METRICS.collectors_failed.load(Ordering::Relaxed),
                METRICS.offers_collected.load(Ordering::Relaxed),
                METRICS.offers_dropped.load(Ordering::Relaxed),
                METRICS.http_requests.load(Ordering::Relaxed),
                METRICS.refresh_kicks.load(Ordering::Relaxed),
            );
        }
    });

    // --------------------------------------------------------
    // Refresh scheduler + HTTP server
    //
    // The scheduler owns the write side of the cache; the server
    // only reads it. One Notify carries manual refresh kicks
    // from the server to the scheduler.
    // --------------------------------------------------------
    let refresh = Arc::new(Notify::new());
    tokio::spawn(cache::run_scheduler(
        Arc::clone(&config),
        ctx,
        Arc::clone(&cache),
        Arc::clone(&refresh),
    ));

    let state = server::ApiState {
        cache,
        refresh,
        admin_token: config.server.resolve_admin_token(),
    };
    server::serve(&config.server, state).await
}

/// `[config-path] [--once]`, in any order.
fn parse_args() -> (String, bool) {
    let mut config_path = String::from("config.json");
    let mut once = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => once = true,
            other => config_path = other.to_string(),
        }
    }

    (config_path, once)
}
