use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level configuration structure loaded from `config.json`
// (path overridable via the first CLI argument). When the file is
// absent, the built-in defaults below apply. They mirror the
// production exchange set, so a bare checkout runs without any
// config file.
//
// It defines:
// - HTTP server settings
// - Refresh cadence and collector timeout budgets
// - Asset pair under observation
// - Headless-browser behavior for the scrape collectors
// - The exchange table
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// HTTP serving settings
    pub server: ServerConfig,

    /// Refresh interval and timeout budgets
    pub refresh: RefreshConfig,

    /// Reference/stable asset pair the collectors query
    pub assets: AssetConfig,

    /// Headless-browser settings shared by all scrape collectors
    pub browser: BrowserConfig,

    /// Whole-day buckets for the best-by-duration ranking
    pub duration_buckets: Vec<i64>,

    /// List of exchange configurations
    pub exchanges: Vec<ExchangeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            refresh: RefreshConfig::default(),
            assets: AssetConfig::default(),
            browser: BrowserConfig::default(),
            duration_buckets: vec![1, 2, 3, 5, 7],
            exchanges: default_exchanges(),
        }
    }
}

impl Config {
    /// Reads a JSON configuration file from disk.
    ///
    /// A missing file is not an error: the built-in defaults are
    /// returned so the service can run from a bare checkout. Any
    /// other I/O or syntax problem is.
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("config file '{}' not found, using built-in defaults", path);
                return Ok(Config::default());
            }
            Err(e) => return Err(e).with_context(|| format!("reading config file '{}'", path)),
        };

        serde_json::from_str(&data).with_context(|| format!("parsing config file '{}'", path))
    }

    /// Number of collectors that will run each cycle.
    pub fn enabled_exchanges(&self) -> usize {
        self.exchanges.iter().filter(|e| e.enabled).count()
    }
}

// ------------------------------------------------------------
// Server configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address of the HTTP API
    pub bind: String,

    /// Bearer token guarding POST /api/refresh.
    ///
    /// Resolution order: this field, then the ADMIN_TOKEN environment
    /// variable. When neither is set the endpoint always replies 401.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:3001".to_string(),
            admin_token: None,
        }
    }
}

impl ServerConfig {
    pub fn resolve_admin_token(&self) -> Option<String> {
        self.admin_token
            .clone()
            .or_else(|| std::env::var("ADMIN_TOKEN").ok())
    }
}

// ------------------------------------------------------------
// Refresh configuration
// ------------------------------------------------------------
//
// One background cycle runs all enabled collectors concurrently.
// Budgets are per collector, not per cycle: a slow scraper burns its
// own budget without delaying the API collectors.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between refresh cycles
    pub interval_secs: u64,

    /// Default timeout budget for API collectors (seconds)
    pub api_timeout_secs: u64,

    /// Default timeout budget for scrape collectors (seconds).
    /// Browser startup plus page render needs far more headroom than
    /// a REST call.
    pub scrape_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            interval_secs: 300,
            api_timeout_secs: 15,
            scrape_timeout_secs: 60,
        }
    }
}

// ------------------------------------------------------------
// Asset configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssetConfig {
    /// Reference asset the offers settle against
    pub reference: String,

    /// Stable asset used as the invest side of PUT offers
    pub stable: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        AssetConfig {
            reference: "BTC".to_string(),
            stable: "USDT".to_string(),
        }
    }
}

// ------------------------------------------------------------
// Browser configuration
// ------------------------------------------------------------
//
// Applied when a scrape collector opens its page session. The
// realistic viewport/user-agent pair and the blocked resource list
// are plain configuration; collectors never see them.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run the browser without a visible window
    pub headless: bool,

    /// Pass --no-sandbox (required in most container environments)
    pub no_sandbox: bool,

    /// Pass --disable-gpu
    pub disable_gpu: bool,

    /// Viewport size reported to the page
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// User-agent string reported to the page
    pub user_agent: String,

    /// Resource types aborted during page load
    /// (recognized: "image", "stylesheet", "font", "media")
    pub blocked_resources: Vec<String>,

    /// Upper bound for individual browser commands (seconds)
    pub request_timeout_secs: u64,

    /// Fixed settle delay after navigation, before selector waits
    /// (milliseconds). Gives late XHR-rendered tables time to fill.
    pub nav_grace_ms: u64,

    /// Budget for the content-selector wait (seconds)
    pub selector_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            headless: true,
            no_sandbox: true,
            disable_gpu: true,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            blocked_resources: vec![
                "image".to_string(),
                "stylesheet".to_string(),
                "font".to_string(),
                "media".to_string(),
            ],
            request_timeout_secs: 30,
            nav_grace_ms: 2000,
            selector_timeout_secs: 15,
        }
    }
}

// ------------------------------------------------------------
// Exchange configuration
// ------------------------------------------------------------
//
// One entry per exchange. API exchanges need `base_url` and
// credentials; scrape exchanges need `page_url`. Credentials may be
// left out of the file and provided via environment variables
// instead ({NAME}_API_KEY / {NAME}_API_SECRET / {NAME}_API_PASSPHRASE,
// uppercase), which keeps config.json committable.
//
#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Exchange identifier (e.g. "binance", "pionex")
    pub name: String,

    /// Enables or disables this exchange at runtime
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Collection mechanism
    pub source: SourceKind,

    /// REST base URL (API exchanges)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Page URL to scrape (scrape exchanges)
    #[serde(default)]
    pub page_url: Option<String>,

    /// API key; env fallback {NAME}_API_KEY
    #[serde(default)]
    pub api_key: Option<String>,

    /// API secret; env fallback {NAME}_API_SECRET
    #[serde(default)]
    pub api_secret: Option<String>,

    /// API passphrase (KuCoin, OKX); env fallback {NAME}_API_PASSPHRASE
    #[serde(default)]
    pub api_passphrase: Option<String>,

    /// Per-exchange timeout override (seconds); defaults to the
    /// class budget from `refresh`
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Collection mechanism of an exchange.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Api,
    Scrape,
}

impl ExchangeConfig {
    fn env_credential(&self, suffix: &str) -> Option<String> {
        std::env::var(format!("{}_{}", self.name.to_uppercase(), suffix)).ok()
    }

    pub fn resolve_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| self.env_credential("API_KEY"))
    }

    pub fn resolve_secret(&self) -> Option<String> {
        self.api_secret.clone().or_else(|| self.env_credential("API_SECRET"))
    }

    pub fn resolve_passphrase(&self) -> Option<String> {
        self.api_passphrase.clone().or_else(|| self.env_credential("API_PASSPHRASE"))
    }

    /// Effective timeout budget for this exchange.
    pub fn budget(&self, refresh: &RefreshConfig) -> Duration {
        let default_secs = match self.source {
            SourceKind::Api => refresh.api_timeout_secs,
            SourceKind::Scrape => refresh.scrape_timeout_secs,
        };
        Duration::from_secs(self.timeout_secs.unwrap_or(default_secs))
    }
}

fn default_true() -> bool {
    true
}

/// Built-in exchange table: the three API venues and four scrape
/// venues this service observes in production.
fn default_exchanges() -> Vec<ExchangeConfig> {
    fn api(name: &str, base_url: &str) -> ExchangeConfig {
        ExchangeConfig {
            name: name.to_string(),
            enabled: true,
            source: SourceKind::Api,
            base_url: Some(base_url.to_string()),
            page_url: None,
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            timeout_secs: None,
        }
    }

    fn scrape(name: &str, page_url: &str) -> ExchangeConfig {
        ExchangeConfig {
            name: name.to_string(),
            enabled: true,
            source: SourceKind::Scrape,
            base_url: None,
            page_url: Some(page_url.to_string()),
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            timeout_secs: None,
        }
    }

    vec![
        api("binance", "https://api.binance.com"),
        api("kucoin", "https://api.kucoin.com"),
        api("okx", "https://www.okx.com"),
        scrape("pionex", "https://www.pionex.com/en/invest/btc"),
        scrape("bybit", "https://www.bybit.com/en/earn/dual-asset"),
        scrape("bitget", "https://www.bitget.com/earn/dual-investment"),
        scrape("bingx", "https://bingx.com/en-us/wealth/dual-investment/"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_seven_exchanges() {
        let cfg = Config::default();

        assert_eq!(cfg.exchanges.len(), 7);
        assert_eq!(cfg.enabled_exchanges(), 7);
        assert_eq!(cfg.duration_buckets, vec![1, 2, 3, 5, 7]);

        let api_count = cfg
            .exchanges
            .iter()
            .filter(|e| e.source == SourceKind::Api)
            .count();
        assert_eq!(api_count, 3);

        for ex in &cfg.exchanges {
            match ex.source {
                SourceKind::Api => assert!(ex.base_url.is_some(), "{} needs base_url", ex.name),
                SourceKind::Scrape => assert!(ex.page_url.is_some(), "{} needs page_url", ex.name),
            }
        }
    }

    #[test]
    fn partial_config_file_keeps_defaults_elsewhere() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "refresh": { "interval_secs": 60 },
                "exchanges": [
                    { "name": "binance", "source": "api", "base_url": "https://api.binance.com" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.refresh.interval_secs, 60);
        // Untouched fields of a partially given section fall back
        assert_eq!(cfg.refresh.api_timeout_secs, 15);
        assert_eq!(cfg.server.bind, "0.0.0.0:3001");
        assert_eq!(cfg.exchanges.len(), 1);
        assert!(cfg.exchanges[0].enabled);
    }

    #[test]
    fn budget_prefers_exchange_override() {
        let refresh = RefreshConfig::default();
        let mut ex = default_exchanges().remove(0);

        assert_eq!(ex.budget(&refresh), Duration::from_secs(15));

        ex.timeout_secs = Some(45);
        assert_eq!(ex.budget(&refresh), Duration::from_secs(45));

        let scrape_ex = default_exchanges().remove(4);
        assert_eq!(scrape_ex.budget(&refresh), Duration::from_secs(60));
    }

    #[test]
    fn config_credentials_win_over_environment() {
        let ex = ExchangeConfig {
            name: "testex".to_string(),
            enabled: true,
            source: SourceKind::Api,
            base_url: None,
            page_url: None,
            api_key: Some("from-config".to_string()),
            api_secret: None,
            api_passphrase: None,
            timeout_secs: None,
        };

        assert_eq!(ex.resolve_key().as_deref(), Some("from-config"));
        // TESTEX_API_SECRET is set nowhere
        assert_eq!(ex.resolve_secret(), None);
    }
}
