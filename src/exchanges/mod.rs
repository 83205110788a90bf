//! Collector registry and factory
//!
//! This module provides:
//! - Central registration of all supported exchanges
//! - A factory that builds a fresh collector set for one cycle
//!
//! All exchange-specific logic must live in dedicated collector
//! modules. The rest of the application must interact exclusively
//! through the `Collector` trait.

pub mod collector;

pub mod binance;
pub mod kucoin;
pub mod okx;
pub mod scrape;

use std::sync::Arc;

use crate::browser::BrowserLauncher;
use crate::config::{Config, ExchangeConfig, SourceKind};
use collector::Collector;

/// Shared handles passed into every collector the factory builds.
///
/// The HTTP client is reused across cycles (connection pooling); the
/// launcher is stateless. Everything else a collector holds is
/// cloned from configuration at build time.
#[derive(Clone)]
pub struct CollectorContext {
    pub http: reqwest::Client,
    pub launcher: Arc<dyn BrowserLauncher>,
}

/// Builds one collector per enabled exchange.
///
/// This function acts as a **central factory / registry** for all
/// supported exchanges.
///
/// DESIGN:
/// - Keeps collector creation in one place
/// - Collectors are cycle-scoped: a fresh set is built for every
///   refresh cycle and dropped when the cycle ends, so no connection
///   or page state leaks between cycles
/// - Enables compile-time visibility of supported exchanges
///
/// CONTRACT:
/// - `exchange.name` in config MUST match a registered name below
/// - Unknown names are skipped with a warning, never an error
///
pub fn build_collectors(config: &Config, ctx: &CollectorContext) -> Vec<Box<dyn Collector>> {
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    for exchange in config.exchanges.iter().filter(|e| e.enabled) {
        match build_collector(exchange, config, ctx) {
            Some(c) => collectors.push(c),
            None => log::warn!(
                "[registry] no collector registered for '{}' ({:?} source), skipping",
                exchange.name,
                exchange.source
            ),
        }
    }

    collectors
}

fn build_collector(
    exchange: &ExchangeConfig,
    config: &Config,
    ctx: &CollectorContext,
) -> Option<Box<dyn Collector>> {
    let budget = exchange.budget(&config.refresh);

    match exchange.source {
        SourceKind::Api => match exchange.name.as_str() {
            "binance" => Some(Box::new(binance::BinanceCollector::new(
                exchange.clone(),
                config.assets.clone(),
                ctx.http.clone(),
                budget,
            ))),
            "kucoin" => Some(Box::new(kucoin::KucoinCollector::new(
                exchange.clone(),
                config.assets.clone(),
                ctx.http.clone(),
                budget,
            ))),
            "okx" => Some(Box::new(okx::OkxCollector::new(
                exchange.clone(),
                config.assets.clone(),
                ctx.http.clone(),
                budget,
            ))),
            _ => None,
        },
        SourceKind::Scrape => {
            let strategy = scrape::strategy_for(&exchange.name)?;
            Some(Box::new(scrape::ScrapeCollector::new(
                exchange.clone(),
                config.browser.clone(),
                Arc::clone(&ctx.launcher),
                strategy,
                budget,
            )))
        }
    }
}
