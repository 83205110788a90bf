use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::config::ExchangeConfig;
use crate::error::CollectError;
use crate::schema::{ApiOffer, FetchOutcome, RawOffer};
use crate::util;

use super::collector::Collector;

/// OKX earn-offers collector
///
/// OKX Finance REST v5:
/// https://www.okx.com/docs-v5/en/#financial-product
///
/// OKX groups all earn products behind one endpoint and quotes
/// neither a strike price nor an option side. Those gaps stay empty
/// here; the normalizer fills the canonical defaults.
///
/// Signing: base64 HMAC-SHA256 over `timestamp + method + path`
/// where the timestamp is ISO-8601 with milliseconds.
pub struct OkxCollector {
    cfg: ExchangeConfig,
    http: reqwest::Client,
    budget: Duration,
}

const OFFERS_PATH: &str = "/api/v5/finance/staking-defi/offers";

// --------------------------------------------------
// Wire types
// --------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Product>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Product {
    ccy: Option<String>,
    product_id: Option<String>,
    /// e.g. "1D", "7D", "30D"
    term: Option<String>,
    apy: Option<String>,
    invest_data: Vec<InvestLeg>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct InvestLeg {
    ccy: Option<String>,
    min_amt: Option<String>,
    max_amt: Option<String>,
}

/// Leading digits of the term string; unparseable terms count as one
/// day rather than being dropped.
fn parse_term_days(term: Option<&str>) -> i64 {
    term.and_then(|t| {
        let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    })
    .unwrap_or(1)
}

fn map_product(p: Product) -> ApiOffer {
    let leg = p.invest_data.into_iter().next();
    let (leg_ccy, min_amount, max_amount) = match leg {
        Some(leg) => (
            leg.ccy,
            leg.min_amt.and_then(|s| s.parse().ok()),
            leg.max_amt.and_then(|s| s.parse().ok()),
        ),
        None => (None, None, None),
    };

    ApiOffer {
        product_id: p.product_id,
        invest_asset: leg_ccy.or(p.ccy),
        exercise_asset: None,
        direction: None,
        apy_pct: p.apy.and_then(|s| s.parse::<f64>().ok()).map(|f| f * 100.0),
        target_price: None,
        duration_days: Some(parse_term_days(p.term.as_deref())),
        settle_at_ms: None,
        min_amount,
        max_amount,
    }
}

impl OkxCollector {
    pub fn new(
        cfg: ExchangeConfig,
        _assets: crate::config::AssetConfig,
        http: reqwest::Client,
        budget: Duration,
    ) -> Self {
        OkxCollector { cfg, http, budget }
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
        let base = self.cfg.base_url.as_deref().unwrap_or("https://www.okx.com");

        let timestamp = util::iso_now();
        let payload = format!("{}GET{}", timestamp, OFFERS_PATH);
        let signature = util::hmac_sha256_base64(&secret, &payload);

        let resp = self
            .http
            .get(format!("{}{}", base, OFFERS_PATH))
            .header("OK-ACCESS-KEY", key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", passphrase)
            .header("Content-Type", "application/json")
            .send()
            .await?
            .error_for_status()?;

        let env = resp
            .json::<Envelope>()
            .await
            .map_err(|e| CollectError::Parse(format!("decoding envelope: {}", e)))?;

        if env.code != "0" {
            return Err(CollectError::Parse(format!(
                "API error {}: {}",
                env.code, env.msg
            )));
        }

        Ok(env
            .data
            .into_iter()
            .map(|p| RawOffer::Api(map_product(p)))
            .collect())
    }
}

#[async_trait::async_trait]
impl Collector for OkxCollector {
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
                log::info!("[okx] fetched {} products", raw.len());
                FetchOutcome::ok(&self.cfg.name, raw, started)
            }
            Err(e) => {
                log::warn!("[okx] fetch failed: {}", e);
                FetchOutcome::failure(&self.cfg.name, e.to_string(), started)
            }
        }
    }
}
