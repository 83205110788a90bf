use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::config::{AssetConfig, ExchangeConfig};
use crate::error::CollectError;
use crate::schema::{ApiOffer, FetchOutcome, OptionSide, RawOffer};
use crate::util;

use super::collector::Collector;

/// Binance Dual Investment collector
///
/// Binance DCI REST:
/// https://developers.binance.com/docs/dual_investment
///
/// One signed GET per option side (PUT then CALL), both within a
/// single fetch call. Requests are signed with hex HMAC-SHA256 over
/// the query string, per Binance SIGNED endpoint rules.
pub struct BinanceCollector {
    cfg: ExchangeConfig,
    assets: AssetConfig,
    http: reqwest::Client,
    budget: Duration,
}

// --------------------------------------------------
// Wire types
// --------------------------------------------------
// Every field is optional on purpose: a half-filled product must end
// up as an incomplete raw offer (dropped later by the normalizer),
// not sink the whole response.

#[derive(Debug, Deserialize)]
struct ProductList {
    #[serde(default)]
    list: Vec<Product>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Product {
    id: Option<String>,
    invest_coin: Option<String>,
    exercised_coin: Option<String>,
    strike_price: Option<String>,
    duration: Option<i64>,
    settle_date: Option<i64>,
    apr: Option<String>,
    min_amount: Option<String>,
    max_amount: Option<String>,
    option_type: Option<String>,
}

fn parse_side(s: Option<&str>) -> Option<OptionSide> {
    match s {
        Some("PUT") => Some(OptionSide::Put),
        Some("CALL") => Some(OptionSide::Call),
        _ => None,
    }
}

fn map_product(p: Product) -> ApiOffer {
    ApiOffer {
        product_id: p.id,
        invest_asset: p.invest_coin,
        exercise_asset: p.exercised_coin,
        direction: parse_side(p.option_type.as_deref()),
        // Binance quotes apr as a fraction ("0.9317" = 93.17 %)
        apy_pct: p.apr.and_then(|s| s.parse::<f64>().ok()).map(|f| f * 100.0),
        target_price: p.strike_price.and_then(|s| s.parse().ok()),
        duration_days: p.duration,
        settle_at_ms: p.settle_date,
        min_amount: p.min_amount.and_then(|s| s.parse().ok()),
        max_amount: p.max_amount.and_then(|s| s.parse().ok()),
    }
}

impl BinanceCollector {
    pub fn new(
        cfg: ExchangeConfig,
        assets: AssetConfig,
        http: reqwest::Client,
        budget: Duration,
    ) -> Self {
        BinanceCollector {
            cfg,
            assets,
            http,
            budget,
        }
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
        let base = self
            .cfg
            .base_url
            .as_deref()
            .unwrap_or("https://api.binance.com");

        let mut raw = Vec::new();
        for side in [OptionSide::Put, OptionSide::Call] {
            let page = self.fetch_side(base, &key, &secret, side).await?;
            raw.extend(page.list.into_iter().map(|p| RawOffer::Api(map_product(p))));
        }

        Ok(raw)
    }

    async fn fetch_side(
        &self,
        base: &str,
        key: &str,
        secret: &str,
        side: OptionSide,
    ) -> Result<ProductList, CollectError> {
        // PUT offers invest the stable asset and exercise into the
        // reference asset; CALL is the reverse.
        let (invest, exercised) = match side {
            OptionSide::Put => (self.assets.stable.as_str(), self.assets.reference.as_str()),
            OptionSide::Call => (self.assets.reference.as_str(), self.assets.stable.as_str()),
        };

        let params = [
            ("optionType", side.as_str().to_string()),
            ("exercisedCoin", exercised.to_string()),
            ("investCoin", invest.to_string()),
            ("pageSize", "100".to_string()),
            ("pageIndex", "1".to_string()),
        ];

        // Signature covers the exact string sent, timestamp included
        let query = format!("{}&timestamp={}", util::canonical_query(&params), util::now_ms());
        let signature = util::hmac_sha256_hex(secret, &query);
        let url = format!("{}/sapi/v1/dci/product/list?{}&signature={}", base, query, signature);

        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", key)
            .send()
            .await?
            .error_for_status()?;

        resp.json::<ProductList>()
            .await
            .map_err(|e| CollectError::Parse(format!("decoding product list: {}", e)))
    }
}

#[async_trait::async_trait]
impl Collector for BinanceCollector {
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
                log::info!("[binance] fetched {} products", raw.len());
                FetchOutcome::ok(&self.cfg.name, raw, started)
            }
            Err(e) => {
                log::warn!("[binance] fetch failed: {}", e);
                FetchOutcome::failure(&self.cfg.name, e.to_string(), started)
            }
        }
    }
}
