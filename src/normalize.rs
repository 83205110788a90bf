//! Raw offer normalization
//!
//! Converts collector output into canonical offers. This is the only
//! place that parses scraped cell text, applies canonical defaults
//! and enforces the offer invariant (finite apy > 0, duration >= 1).
//! Rows that cannot satisfy the invariant are dropped and counted,
//! never zero-filled.

use std::sync::atomic::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::AssetConfig;
use crate::metrics::METRICS;
use crate::schema::{ApiOffer, FetchOutcome, Offer, OptionSide, Provenance, RawOffer, ScrapedRow};

/// First signed decimal in a cell ("+93.168%" -> 93.168).
static SIGNED_DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?\d+\.?\d*").expect("pattern is valid"));

/// First integer in a cell ("1 Day" -> 1).
static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("pattern is valid"));

/// First thousands-grouped figure in a cell ("94,500" -> 94500).
static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\d,]+\.?\d*").expect("pattern is valid"));

fn parse_signed_decimal(text: &str) -> Option<f64> {
    SIGNED_DECIMAL_RE.find(text)?.as_str().parse().ok()
}

fn parse_first_int(text: &str) -> Option<i64> {
    INT_RE.find(text)?.as_str().parse().ok()
}

fn parse_price(text: &str) -> Option<f64> {
    PRICE_RE.find(text)?.as_str().replace(',', "").parse().ok()
}

/// Page-quoted distance wins; otherwise it is derived from spot and
/// target when both are known. Offers without a quoted strike keep
/// no distance at all.
fn diff_percent(quoted: Option<f64>, target: f64, price: Option<f64>) -> Option<f64> {
    match quoted {
        Some(d) if d.is_finite() => Some(d),
        _ => match price {
            Some(p) if p > 0.0 && target > 0.0 => Some((target - p) / p * 100.0),
            _ => None,
        },
    }
}

/// Normalizes every successful outcome of one cycle.
///
/// GUARANTEES:
/// - Output offers all satisfy the invariant
/// - Every offer carries a product id; rows without one get
///   `{exchange}_{idx}` with idx counting that exchange's emitted
///   offers
/// - `fetched_at` is stamped from the owning outcome, so normalizing
///   the same cycle twice yields identical offers
///
pub fn normalize(
    outcomes: &[FetchOutcome],
    reference_price: Option<f64>,
    assets: &AssetConfig,
) -> Vec<Offer> {
    let mut offers = Vec::new();

    for outcome in outcomes.iter().filter(|o| o.success) {
        let mut emitted = 0usize;

        for raw in &outcome.raw {
            let normalized = match raw {
                RawOffer::Api(api) => {
                    normalize_api(&outcome.exchange, api, reference_price, assets, outcome.fetched_at)
                }
                RawOffer::Row(row) => {
                    normalize_row(&outcome.exchange, row, reference_price, assets, outcome.fetched_at)
                }
            };

            match normalized {
                Some(mut offer) => {
                    if offer.product_id.is_none() {
                        offer.product_id = Some(format!("{}_{}", outcome.exchange, emitted));
                    }
                    emitted += 1;
                    offers.push(offer);
                }
                None => {
                    METRICS.offers_dropped.fetch_add(1, Ordering::Relaxed);
                    log::debug!("[normalize] {} dropped unusable offer: {:?}", outcome.exchange, raw);
                }
            }
        }
    }

    offers
}

fn normalize_api(
    exchange: &str,
    api: &ApiOffer,
    price: Option<f64>,
    assets: &AssetConfig,
    fetched_at: DateTime<Utc>,
) -> Option<Offer> {
    let apy = api.apy_pct.filter(|v| v.is_finite() && *v > 0.0)?;
    let duration_days = api.duration_days.filter(|d| *d >= 1)?;

    // Absent or nonsensical strike means "not quoted", shown as zero
    let target_price = api
        .target_price
        .filter(|t| t.is_finite() && *t > 0.0)
        .unwrap_or(0.0);

    Some(Offer {
        exchange: exchange.to_string(),
        product_id: api.product_id.clone(),
        invest_coin: api
            .invest_asset
            .clone()
            .unwrap_or_else(|| assets.stable.clone()),
        exercise_coin: api
            .exercise_asset
            .clone()
            .unwrap_or_else(|| assets.reference.clone()),
        option_type: api.direction.unwrap_or(OptionSide::Put),
        apy,
        target_price,
        current_price: price,
        price_diff_percent: diff_percent(None, target_price, price),
        duration_days,
        settle_date: api
            .settle_at_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        min_amount: api.min_amount,
        max_amount: api.max_amount,
        fetched_at,
        data_source: Provenance::Api,
    })
}

fn normalize_row(
    exchange: &str,
    row: &ScrapedRow,
    price: Option<f64>,
    assets: &AssetConfig,
    fetched_at: DateTime<Utc>,
) -> Option<Offer> {
    let apy = parse_signed_decimal(&row.apy_text).filter(|v| v.is_finite() && *v > 0.0)?;

    // Missing duration cell means a one-day offer on these pages;
    // a present but zero duration is bad data
    let duration_days = match row.duration_text.as_deref() {
        Some(text) => parse_first_int(text)?,
        None => 1,
    };
    if duration_days < 1 {
        return None;
    }

    let target_price = row
        .target_text
        .as_deref()
        .and_then(parse_price)
        .filter(|t| t.is_finite() && *t > 0.0)
        .unwrap_or(0.0);

    let quoted_diff = row.diff_text.as_deref().and_then(parse_signed_decimal);

    Some(Offer {
        exchange: exchange.to_string(),
        product_id: None,
        invest_coin: assets.stable.clone(),
        exercise_coin: assets.reference.clone(),
        option_type: OptionSide::Put,
        apy,
        target_price,
        current_price: price,
        price_diff_percent: diff_percent(quoted_diff, target_price, price),
        duration_days,
        settle_date: None,
        min_amount: None,
        max_amount: None,
        fetched_at,
        data_source: Provenance::Scrape,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn assets() -> AssetConfig {
        AssetConfig::default()
    }

    fn outcome_with(exchange: &str, raw: Vec<RawOffer>) -> FetchOutcome {
        FetchOutcome::ok(exchange, raw, Instant::now())
    }

    fn row(apy: &str, duration: Option<&str>, target: Option<&str>, diff: Option<&str>) -> RawOffer {
        RawOffer::Row(ScrapedRow {
            apy_text: apy.to_string(),
            duration_text: duration.map(str::to_string),
            target_text: target.map(str::to_string),
            diff_text: diff.map(str::to_string),
        })
    }

    #[test]
    fn scraped_cells_parse_into_canonical_offers() {
        let outcomes = vec![outcome_with(
            "pionex",
            vec![
                row("+93.168%", Some("1 Day"), Some("94,500"), Some("-0.72%")),
                row("42.5%", Some("3 Days"), Some("91,000"), None),
            ],
        )];

        let offers = normalize(&outcomes, Some(100_000.0), &assets());
        assert_eq!(offers.len(), 2);

        let first = &offers[0];
        assert_eq!(first.exchange, "pionex");
        assert_eq!(first.product_id.as_deref(), Some("pionex_0"));
        assert_eq!(first.invest_coin, "USDT");
        assert_eq!(first.exercise_coin, "BTC");
        assert_eq!(first.option_type, OptionSide::Put);
        assert!((first.apy - 93.168).abs() < 1e-9);
        assert_eq!(first.target_price, 94_500.0);
        assert_eq!(first.duration_days, 1);
        assert_eq!(first.data_source, Provenance::Scrape);
        // The page already quoted a distance; it is not recomputed
        assert!((first.price_diff_percent.unwrap() - (-0.72)).abs() < 1e-9);

        let second = &offers[1];
        assert_eq!(second.product_id.as_deref(), Some("pionex_1"));
        assert_eq!(second.duration_days, 3);
        // No quoted distance: derived from spot 100k and target 91k
        assert!((second.price_diff_percent.unwrap() - (-9.0)).abs() < 1e-9);
        assert_eq!(second.current_price, Some(100_000.0));
    }

    #[test]
    fn api_offers_get_canonical_defaults() {
        let sparse = ApiOffer {
            product_id: Some("6017".to_string()),
            invest_asset: Some("USDT".to_string()),
            apy_pct: Some(25.75),
            duration_days: Some(7),
            ..ApiOffer::default()
        };
        let outcomes = vec![outcome_with("okx", vec![RawOffer::Api(sparse)])];

        let offers = normalize(&outcomes, Some(95_000.0), &assets());
        assert_eq!(offers.len(), 1);

        let offer = &offers[0];
        assert_eq!(offer.product_id.as_deref(), Some("6017"));
        assert_eq!(offer.exercise_coin, "BTC");
        assert_eq!(offer.option_type, OptionSide::Put);
        assert_eq!(offer.target_price, 0.0);
        // Unquoted strike never produces a distance
        assert_eq!(offer.price_diff_percent, None);
        assert_eq!(offer.current_price, Some(95_000.0));
        assert_eq!(offer.data_source, Provenance::Api);
    }

    #[test]
    fn invariant_violations_are_dropped_not_defaulted() {
        let outcomes = vec![
            outcome_with(
                "bitget",
                vec![
                    row("Subscribe now", None, None, None),
                    row("0%", None, None, None),
                    row("-5.0%", None, None, None),
                    row("12.5%", Some("0 Days"), None, None),
                    row("12.5%", Some("soon"), None, None),
                    row("12.5%", None, None, None),
                ],
            ),
            outcome_with(
                "binance",
                vec![
                    RawOffer::Api(ApiOffer {
                        apy_pct: None,
                        duration_days: Some(3),
                        ..ApiOffer::default()
                    }),
                    RawOffer::Api(ApiOffer {
                        apy_pct: Some(f64::NAN),
                        duration_days: Some(3),
                        ..ApiOffer::default()
                    }),
                    RawOffer::Api(ApiOffer {
                        apy_pct: Some(15.0),
                        duration_days: None,
                        ..ApiOffer::default()
                    }),
                ],
            ),
        ];

        let offers = normalize(&outcomes, None, &assets());

        // Only the bitget row with a usable rate and defaultable
        // duration survives
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].exchange, "bitget");
        assert_eq!(offers[0].duration_days, 1);
        assert_eq!(offers[0].product_id.as_deref(), Some("bitget_0"));
    }

    #[test]
    fn synthesized_ids_skip_offers_that_brought_their_own() {
        let outcomes = vec![outcome_with(
            "binance",
            vec![
                RawOffer::Api(ApiOffer {
                    product_id: Some("741344".to_string()),
                    apy_pct: Some(93.17),
                    duration_days: Some(3),
                    ..ApiOffer::default()
                }),
                RawOffer::Api(ApiOffer {
                    product_id: None,
                    apy_pct: Some(10.0),
                    duration_days: Some(1),
                    ..ApiOffer::default()
                }),
            ],
        )];

        let offers = normalize(&outcomes, None, &assets());

        assert_eq!(offers[0].product_id.as_deref(), Some("741344"));
        assert_eq!(offers[1].product_id.as_deref(), Some("binance_1"));
    }

    #[test]
    fn missing_reference_price_leaves_enrichment_empty() {
        let outcomes = vec![outcome_with(
            "pionex",
            vec![row("50%", Some("2 Days"), Some("90,000"), None)],
        )];

        let offers = normalize(&outcomes, None, &assets());

        assert_eq!(offers[0].current_price, None);
        assert_eq!(offers[0].price_diff_percent, None);
        assert_eq!(offers[0].target_price, 90_000.0);
    }

    #[test]
    fn failed_outcomes_contribute_nothing() {
        let outcomes = vec![
            FetchOutcome::failure("bybit", "timed out".to_string(), Instant::now()),
            outcome_with("pionex", vec![row("10%", None, None, None)]),
        ];

        let offers = normalize(&outcomes, None, &assets());

        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].exchange, "pionex");
    }

    #[test]
    fn normalization_is_deterministic() {
        let outcomes = vec![outcome_with(
            "pionex",
            vec![
                row("+93.168%", Some("1 Day"), Some("94,500"), Some("-0.72%")),
                row("42.5%", Some("3 Days"), Some("91,000"), None),
            ],
        )];

        let a = normalize(&outcomes, Some(100_000.0), &assets());
        let b = normalize(&outcomes, Some(100_000.0), &assets());

        assert_eq!(a, b);
    }
}
