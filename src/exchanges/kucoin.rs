use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::config::ExchangeConfig;
use crate::error::CollectError;
use crate::schema::{ApiOffer, FetchOutcome, OptionSide, RawOffer};
use crate::util;

use super::collector::Collector;

/// KuCoin Dual Investment collector
///
/// KuCoin Earn REST:
/// https://www.kucoin.com/docs/rest/earn/dual-investment
///
/// KC-API v2 signing: base64 HMAC-SHA256 over
/// `timestamp + method + path` with the secret, plus a passphrase
/// header that is itself HMAC-signed with the secret.
pub struct KucoinCollector {
    cfg: ExchangeConfig,
    http: reqwest::Client,
    budget: Duration,
}

const PRODUCTS_PATH: &str = "/api/v1/earn/dual/products";
const OK_CODE: &str = "200000";

// --------------------------------------------------
// Wire types
// --------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Vec<Product>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Product {
    id: Option<String>,
    invest_currency: Option<String>,
    exercise_currency: Option<String>,
    strike_price: Option<String>,
    apr: Option<String>,
    /// Days
    term: Option<i64>,
    settlement_time: Option<i64>,
    min_invest_amount: Option<String>,
    max_invest_amount: Option<String>,
    /// "BUY_LOW" (put side) or "SELL_HIGH" (call side)
    product_type: Option<String>,
}

fn unwrap_envelope(env: Envelope) -> Result<Vec<Product>, CollectError> {
    if env.code != OK_CODE {
        return Err(CollectError::Parse(format!(
            "API error {}: {}",
            env.code,
            env.msg.unwrap_or_default()
        )));
    }
    Ok(env.data)
}

fn parse_side(s: Option<&str>) -> Option<OptionSide> {
    match s {
        Some("BUY_LOW") => Some(OptionSide::Put),
        Some("SELL_HIGH") => Some(OptionSide::Call),
        _ => None,
    }
}

fn map_product(p: Product) -> ApiOffer {
    ApiOffer {
        product_id: p.id,
        invest_asset: p.invest_currency,
        exercise_asset: p.exercise_currency,
        direction: parse_side(p.product_type.as_deref()),
        // apr is a fraction on the wire
        apy_pct: p.apr.and_then(|s| s.parse::<f64>().ok()).map(|f| f * 100.0),
        target_price: p.strike_price.and_then(|s| s.parse().ok()),
        duration_days: p.term,
        settle_at_ms: p.settlement_time,
        min_amount: p.min_invest_amount.and_then(|s| s.parse().ok()),
        max_amount: p.max_invest_amount.and_then(|s| s.parse().ok()),
    }
}

impl KucoinCollector {
    pub fn new(
        cfg: ExchangeConfig,
        _assets: crate::config::AssetConfig,
        http: reqwest::Client,
        budget: Duration,
    ) -> Self {
        KucoinCollector { cfg, http, budget }
    }

    async fn collect(&self) -> Result<Vec<RawOffer>, CollectError> {
        let key = self
            .cfg
            .resolve_key()
            .ok_or_else(|| CollectError::Signature("API key not configured".to_string()))?;
        let secret = self
            .cfg
            .resolve_secret()
            .ok_or_else(|| CollectError::Signature("API secret not configured".to_string()))?;
        let passphrase = self
            .cfg
            .resolve_passphrase()
            .ok_or_else(|| CollectError::Signature("API passphrase not configured".to_string()))?;
        let base = self
            .cfg
            .base_url
            .as_deref()
            .unwrap_or("https://api.kucoin.com");

        let timestamp = util::now_ms().to_string();
        let payload = format!("{}GET{}", timestamp, PRODUCTS_PATH);
        let signature = util::hmac_sha256_base64(&secret, &payload);
        let passphrase_sign = util::hmac_sha256_base64(&secret, &passphrase);

        let resp = self
            .http
            .get(format!("{}{}", base, PRODUCTS_PATH))
            .header("KC-API-KEY", key)
            .header("KC-API-SIGN", signature)
            .header("KC-API-TIMESTAMP", timestamp)
            .header("KC-API-PASSPHRASE", passphrase_sign)
            .header("KC-API-KEY-VERSION", "2")
            .header("Content-Type", "application/json")
            .send()
            .await?
            .error_for_status()?;

        let env = resp
            .json::<Envelope>()
            .await
            .map_err(|e| CollectError::Parse(format!("decoding envelope: {}", e)))?;

        let products = unwrap_envelope(env)?;
        Ok(products
            .into_iter()
            .map(|p| RawOffer::Api(map_product(p)))
            .collect())
    }
}

#[async_trait::async_trait]
impl Collector for KucoinCollector {
    fn exchange(&self) -> &str {
        &self.cfg.name
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn fetch(&self) -> FetchOutcome {
        let started = Instant::now();

        match self.collect().await {
            Ok(raw) => {
                log::info!("[kucoin] fetched {} products", raw.len());
                FetchOutcome::ok(&self.cfg.name, raw, started)
            }
            Err(e) => {
                log::warn!("[kucoin] fetch failed: {}", e);
                FetchOutcome::failure(&self.cfg.name, e.to_string(), started)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;

    #[test]
    fn maps_buy_low_and_sell_high_sides() {
        let body = r#"{
            "code": "200000",
            "data": [
                {
                    "id": "2152",
                    "investCurrency": "USDT",
                    "exerciseCurrency": "BTC",
                    "strikePrice": "92500",
                    "apr": "0.4215",
                    "term": 7,
                    "settlementTime": 1736208000000,
                    "minInvestAmount": "10",
                    "maxInvestAmount": "500000",
                    "status": "ONGOING",
                    "productType": "BUY_LOW"
                },
                {
                    "id": "2153",
                    "investCurrency": "BTC",
                    "exerciseCurrency": "USDT",
                    "strikePrice": "99000",
                    "apr": "0.1888",
                    "term": 2,
                    "settlementTime": 1735776000000,
                    "minInvestAmount": "0.001",
                    "maxInvestAmount": "25",
                    "status": "ONGOING",
                    "productType": "SELL_HIGH"
                }
            ]
        }"#;

        let env: Envelope = serde_json::from_str(body).unwrap();
        let products = unwrap_envelope(env).unwrap();
        let offers: Vec<ApiOffer> = products.into_iter().map(map_product).collect();

        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].direction, Some(OptionSide::Put));
        assert!((offers[0].apy_pct.unwrap() - 42.15).abs() < 1e-9);
        assert_eq!(offers[0].target_price, Some(92500.0));
        assert_eq!(offers[0].duration_days, Some(7));

        assert_eq!(offers[1].direction, Some(OptionSide::Call));
        assert_eq!(offers[1].invest_asset.as_deref(), Some("BTC"));
        assert_eq!(offers[1].min_amount, Some(0.001));
    }

    #[test]
    fn non_success_code_is_an_error() {
        let env: Envelope =
            serde_json::from_str(r#"{ "code": "400100", "msg": "Invalid request" }"#).unwrap();

        let err = unwrap_envelope(env).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("400100"), "{}", text);
        assert!(text.contains("Invalid request"), "{}", text);
    }

    #[tokio::test]
    async fn fetch_without_credentials_reports_failure() {
        let cfg = ExchangeConfig {
            name: "kucoin-test".to_string(),
            enabled: true,
            source: SourceKind::Api,
            base_url: Some("https://api.kucoin.com".to_string()),
            page_url: None,
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            api_passphrase: None,
            timeout_secs: None,
        };
        let collector = KucoinCollector::new(
            cfg,
            crate::config::AssetConfig::default(),
            reqwest::Client::new(),
            Duration::from_secs(15),
        );

        let outcome = collector.fetch().await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("passphrase"));
    }
}
