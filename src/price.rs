//! Reference asset spot price
//!
//! Fallback chain: Binance public ticker first, then Coinbase spot.
//! Both endpoints are unauthenticated. A dead chain is not fatal;
//! the cycle proceeds without price enrichment and a later cycle
//! recovers it.

use std::time::Duration;

use serde::Deserialize;

use crate::config::AssetConfig;

const SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct BinanceTicker {
    price: String,
}

#[derive(Debug, Deserialize)]
struct CoinbaseSpot {
    data: CoinbaseAmount,
}

#[derive(Debug, Deserialize)]
struct CoinbaseAmount {
    amount: String,
}

fn valid(price: f64) -> Option<f64> {
    (price.is_finite() && price > 0.0).then_some(price)
}

fn parse_binance(body: &str) -> Option<f64> {
    let ticker: BinanceTicker = serde_json::from_str(body).ok()?;
    valid(ticker.price.parse().ok()?)
}

fn parse_coinbase(body: &str) -> Option<f64> {
    let spot: CoinbaseSpot = serde_json::from_str(body).ok()?;
    valid(spot.data.amount.parse().ok()?)
}

async fn fetch_text(http: &reqwest::Client, url: &str) -> Option<String> {
    let resp = http
        .get(url)
        .timeout(SOURCE_TIMEOUT)
        .send()
        .await
        .ok()?
        .error_for_status()
        .ok()?;
    resp.text().await.ok()
}

/// Current spot price of the reference asset, or `None` when every
/// source is unreachable.
pub async fn fetch_reference_price(http: &reqwest::Client, assets: &AssetConfig) -> Option<f64> {
    let binance_url = format!(
        "https://api.binance.com/api/v3/ticker/price?symbol={}{}",
        assets.reference, assets.stable
    );
    if let Some(price) = fetch_text(http, &binance_url).await.as_deref().and_then(parse_binance) {
        return Some(price);
    }
    log::debug!("[price] binance ticker unavailable, trying coinbase");

    let coinbase_url = format!(
        "https://api.coinbase.com/v2/prices/{}-USD/spot",
        assets.reference
    );
    if let Some(price) = fetch_text(http, &coinbase_url).await.as_deref().and_then(parse_coinbase) {
        return Some(price);
    }

    log::warn!("[price] no reference price source reachable");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binance_ticker_body_parses() {
        let body = r#"{"symbol":"BTCUSDT","price":"97235.50000000"}"#;
        assert_eq!(parse_binance(body), Some(97235.5));
    }

    #[test]
    fn coinbase_spot_body_parses() {
        let body = r#"{"data":{"base":"BTC","currency":"USD","amount":"97241.17"}}"#;
        assert_eq!(parse_coinbase(body), Some(97241.17));
    }

    #[test]
    fn hostile_bodies_yield_none() {
        assert_eq!(parse_binance("not json"), None);
        assert_eq!(parse_binance(r#"{"symbol":"BTCUSDT","price":"n/a"}"#), None);
        assert_eq!(parse_binance(r#"{"symbol":"BTCUSDT","price":"-5"}"#), None);
        assert_eq!(parse_coinbase(r#"{"data":{}}"#), None);
        assert_eq!(parse_coinbase(r#"{"data":{"amount":"0"}}"#), None);
    }
}
