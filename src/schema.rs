use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Option direction of a dual-investment offer.
///
/// The wire strings ("PUT" / "CALL") are part of the consumer contract
/// and must not change.
///
/// - `Put` is "Buy Low": invest the stable asset, settle in the
///   reference asset when price closes at or below the target.
/// - `Call` is "Sell High": invest the reference asset, settle in the
///   stable asset when price closes at or above the target.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionSide {
    Put,
    Call,
}

impl OptionSide {
    /// Wire representation, also used in exchange request parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::Put => "PUT",
            OptionSide::Call => "CALL",
        }
    }
}

/// How an offer was obtained from its exchange.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Typed JSON from an exchange REST endpoint.
    Api,
    /// Extracted from a rendered page in a headless browser.
    Scrape,
}

// ------------------------------------------------------------
// Canonical offer
// ------------------------------------------------------------
//
// One normalized dual-investment quote. Every collector output is
// converted into this shape before ranking; the serving layer emits
// it verbatim (camelCase keys, ISO-8601 timestamps).
//
// INVARIANT:
// - `apy` is finite and > 0
// - `duration_days` >= 1
//
// Rows that cannot satisfy the invariant are dropped by the
// normalizer, never defaulted to zero.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    /// Exchange identifier (e.g. "binance", "pionex")
    pub exchange: String,

    /// Exchange-side product id; synthesized (`{exchange}_{idx}`) for
    /// scraped rows that carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Asset the subscriber pays in (e.g. "USDT")
    pub invest_coin: String,

    /// Asset received if the option exercises (e.g. "BTC")
    pub exercise_coin: String,

    /// PUT ("Buy Low") or CALL ("Sell High")
    pub option_type: OptionSide,

    /// Annualized yield as a percentage (93.168 means 93.168 %)
    pub apy: f64,

    /// Strike price; 0.0 for sources that do not quote one (OKX)
    pub target_price: f64,

    /// Reference asset spot price at collection time, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,

    /// Signed percent distance from current price to target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_diff_percent: Option<f64>,

    /// Offer duration in whole days (>= 1)
    pub duration_days: i64,

    /// Settlement timestamp, when the exchange provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_date: Option<DateTime<Utc>>,

    /// Minimum subscription amount in the invest asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<f64>,

    /// Maximum subscription amount in the invest asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<f64>,

    /// When the owning collector finished its fetch
    pub fetched_at: DateTime<Utc>,

    /// "api" or "scrape"
    pub data_source: Provenance,
}

// ------------------------------------------------------------
// Raw offers (pre-normalization)
// ------------------------------------------------------------
//
// What collectors hand to the normalizer. Two shapes, one per
// collection mechanism:
//
// - Api: typed fields straight out of a JSON response. Collectors
//   convert wire units at parse time (exchanges quote APR as a
//   fraction, the canonical model is a percentage) because unit
//   knowledge is exchange-specific; everything else stays untouched.
// - Row: labeled cell texts captured from a scraped page. All text
//   parsing happens in the normalizer so the four scrape sources
//   share one validation path.
//
#[derive(Debug, Clone, PartialEq)]
pub enum RawOffer {
    Api(ApiOffer),
    Row(ScrapedRow),
}

/// Typed fields from an exchange REST response. Everything is
/// optional; the normalizer applies per-exchange defaults and drops
/// tuples that stay incomplete.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiOffer {
    pub product_id: Option<String>,
    pub invest_asset: Option<String>,
    pub exercise_asset: Option<String>,
    pub direction: Option<OptionSide>,
    /// Already converted to percent units
    pub apy_pct: Option<f64>,
    pub target_price: Option<f64>,
    pub duration_days: Option<i64>,
    /// Milliseconds since the Unix epoch
    pub settle_at_ms: Option<i64>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

/// Cell texts of one scraped row, exactly as they appeared on the
/// page (e.g. `apy_text = "+93.168%"`, `target_text = "94,500"`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrapedRow {
    pub apy_text: String,
    pub duration_text: Option<String>,
    pub target_text: Option<String>,
    pub diff_text: Option<String>,
}

// ------------------------------------------------------------
// Per-collector fetch outcome
// ------------------------------------------------------------
//
// Created once per collector per cycle and never mutated afterwards.
// The orchestrator owns the full set until the normalizer consumes
// it; failures stay in the set so statistics can name the exchanges
// that could not be reached.
//
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Exchange identifier
    pub exchange: String,

    /// False when the collector failed or was cancelled
    pub success: bool,

    /// Raw offers, empty on failure
    pub raw: Vec<RawOffer>,

    /// Failure description for operators and `fetchStats.failed`
    pub error: Option<String>,

    /// When the collector finished (success or failure)
    pub fetched_at: DateTime<Utc>,

    /// Wall-clock duration of the fetch in milliseconds
    pub elapsed_ms: u64,
}

impl FetchOutcome {
    pub fn ok(exchange: &str, raw: Vec<RawOffer>, started: Instant) -> Self {
        FetchOutcome {
            exchange: exchange.to_string(),
            success: true,
            raw,
            error: None,
            fetched_at: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn failure(exchange: &str, error: String, started: Instant) -> Self {
        FetchOutcome {
            exchange: exchange.to_string(),
            success: false,
            raw: Vec::new(),
            error: Some(error),
            fetched_at: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

// ------------------------------------------------------------
// Served snapshot
// ------------------------------------------------------------

/// Collector statistics for one refresh cycle.
///
/// INVARIANT:
/// `successful + failed.len()` equals the number of collectors that
/// ran in the cycle that built the snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FetchStats {
    /// Number of normalized offers in `allProducts`
    pub total: usize,

    /// Collectors that returned a successful outcome
    pub successful: usize,

    /// Exchange ids of collectors that failed or timed out
    pub failed: Vec<String>,
}

/// The immutable aggregate of one refresh cycle.
///
/// Built only after every collector finished or was cancelled, then
/// published by swapping a single atomic reference. Concurrent
/// readers always observe a complete, self-consistent snapshot and
/// never a partially updated one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// When this snapshot was built
    pub last_updated: DateTime<Utc>,

    /// Last known reference asset price; 0.0 until first known.
    /// Key name is part of the consumer contract.
    pub btc_price: f64,

    /// Highest-apy offer over the whole set; explicit null when the
    /// set is empty
    pub best_overall: Option<Offer>,

    /// Best offer per duration bucket, keyed "1d", "2d", …
    /// Buckets without a matching offer are absent, never null.
    pub best_by_duration: BTreeMap<String, Offer>,

    /// Best offer per exchange that produced at least one offer
    pub best_by_exchange: BTreeMap<String, Offer>,

    /// All normalized offers, ordered by the ranking comparator
    pub all_products: Vec<Offer>,

    /// Per-cycle collector statistics
    pub fetch_stats: FetchStats,
}
