use std::time::Duration;

use crate::schema::FetchOutcome;

/// Collector is the core abstraction layer between:
/// - The generic refresh orchestrator
/// - Exchange-specific offer sources (REST APIs and scraped pages)
///
/// Each exchange implementation must:
/// - Fetch the current dual-investment offers for the reference asset
/// - Map provider payloads into raw offers (API fields or row cells)
/// - Report failure inside the outcome instead of returning an error
///
/// DESIGN GOALS:
/// - Zero exchange-specific logic outside collectors
/// - One collector instance per exchange per refresh cycle
/// - Uniform outcome format across all exchanges
///
/// LIFECYCLE:
/// - Instances are built fresh for every cycle and dropped after it;
///   nothing may be carried over between cycles
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - Each instance runs on its own task
///
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Returns the canonical exchange name.
    ///
    /// CONTRACT:
    /// - Must match `exchange.name` in configuration
    /// - Used for:
    ///   - Logging
    ///   - Outcome attribution
    ///   - Offer provenance
    ///
    /// EXAMPLES:
    /// - "binance"
    /// - "kucoin"
    /// - "bybit"
    ///
    fn exchange(&self) -> &str;

    /// Returns the wall-clock budget for one `fetch` call.
    ///
    /// NOTES:
    /// - Enforced by the orchestrator, not by the collector itself
    /// - Scraping collectors need a far larger budget than REST ones
    ///
    fn budget(&self) -> Duration;

    /// Fetches the current offers from this exchange.
    ///
    /// OUTPUT:
    /// - An outcome that is either:
    ///   - success with zero or more raw offers
    ///   - failure with a human-readable error string
    ///
    /// IMPORTANT:
    /// - This function must NEVER propagate an error to the caller;
    ///   every failure mode (network, auth, parse, browser) ends up
    ///   as a failed outcome so one bad exchange cannot sink a cycle
    /// - An empty offer list on success is valid (exchange listed
    ///   nothing for the asset right now)
    ///
    /// DATA NORMALIZATION:
    /// - API collectors convert units at parse time (rates become
    ///   percent figures, durations become whole days)
    /// - Scraping collectors pass cell text through untouched; the
    ///   normalizer owns all text parsing
    ///
    async fn fetch(&self) -> FetchOutcome;
}
