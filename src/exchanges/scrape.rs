//! Generic page-scraping collector
//!
//! Four exchanges publish dual-investment offers only on rendered
//! pages. One collector covers all of them: everything
//! exchange-specific sits in a static `ExtractionStrategy` row
//! (content selector, in-page extraction routine, cell layout,
//! settle grace). Adding a venue means adding a table row, not a
//! collector.
//!
//! The extraction routine returns plain cell texts. Labeling happens
//! here via the layout; all text parsing stays in the normalizer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::browser::{BrowserLauncher, BrowserPage, ResourceKind};
use crate::config::{BrowserConfig, ExchangeConfig};
use crate::error::CollectError;
use crate::schema::{FetchOutcome, RawOffer, ScrapedRow};

use super::collector::Collector;

/// Matches a percent figure anywhere in a cell ("93.168%", "12 %").
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.?\d*\s*%").expect("pattern is valid"));

// --------------------------------------------------
// Extraction strategies
// --------------------------------------------------

/// How the cells of one extracted row map onto offer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// Fixed cell positions. `apy` is mandatory; rows missing that
    /// cell are dropped at labeling time.
    Columns {
        apy: usize,
        duration: Option<usize>,
        target: Option<usize>,
        diff: Option<usize>,
    },

    /// No stable column order: take the first cell carrying a percent
    /// figure as the rate, everything else stays unknown.
    FirstPercent,
}

/// Everything exchange-specific about one scraped venue.
pub struct ExtractionStrategy {
    pub exchange: &'static str,

    /// Element that must exist before extraction is attempted
    pub content_selector: &'static str,

    /// In-page routine; must evaluate to an array of rows, each row
    /// an array of cell strings
    pub extractor_js: &'static str,

    pub layout: RowLayout,

    /// Extra wait after the content selector appears. These pages
    /// render the table shell first and fill numbers from XHR.
    pub settle: Duration,
}

static STRATEGIES: &[ExtractionStrategy] = &[
    // Pionex renders a plain four-column table:
    // rate | duration | target price | distance to spot
    ExtractionStrategy {
        exchange: "pionex",
        content_selector: "table, [class*=\"table\"]",
        extractor_js: r#"
            (() => {
                const rows = document.querySelectorAll('table tbody tr, [class*="table"] [class*="row"]');
                const out = [];
                rows.forEach((row) => {
                    const cells = row.querySelectorAll('td, [class*="cell"]');
                    if (cells.length >= 4) {
                        out.push(Array.from(cells).slice(0, 4).map((c) => (c.textContent || '').trim()));
                    }
                });
                return out;
            })()
        "#,
        layout: RowLayout::Columns {
            apy: 0,
            duration: Some(1),
            target: Some(2),
            diff: Some(3),
        },
        settle: Duration::from_millis(2000),
    },
    // Bybit lays offers out as cards; the class names carry the
    // meaning, not the cell order
    ExtractionStrategy {
        exchange: "bybit",
        content_selector: "[class*=\"dual\"], table",
        extractor_js: r#"
            (() => {
                const cards = document.querySelectorAll('[class*="dual-asset-card"], [class*="product-card"], table tbody tr');
                const out = [];
                cards.forEach((card) => {
                    const apy = card.querySelector('[class*="apy"], [class*="apr"], [class*="rate"]');
                    const duration = card.querySelector('[class*="duration"], [class*="term"], [class*="day"]');
                    const price = card.querySelector('[class*="price"], [class*="strike"]');
                    if (apy) {
                        out.push([
                            (apy.textContent || '').trim(),
                            duration ? (duration.textContent || '').trim() : '',
                            price ? (price.textContent || '').trim() : '',
                        ]);
                    }
                });
                return out;
            })()
        "#,
        layout: RowLayout::Columns {
            apy: 0,
            duration: Some(1),
            target: Some(2),
            diff: None,
        },
        settle: Duration::from_millis(3000),
    },
    // Bitget markup is too volatile for positions; scan for the rate
    ExtractionStrategy {
        exchange: "bitget",
        content_selector: "[class*=\"dual\"], table",
        extractor_js: r#"
            (() => {
                const rows = document.querySelectorAll('table tbody tr, [class*="product-item"]');
                const out = [];
                rows.forEach((row) => {
                    const cells = row.querySelectorAll('td, [class*="cell"]');
                    const texts = Array.from(cells).map((c) => (c.textContent || '').trim());
                    if (texts.length > 0) {
                        out.push(texts);
                    }
                });
                return out;
            })()
        "#,
        layout: RowLayout::FirstPercent,
        settle: Duration::from_millis(3000),
    },
    ExtractionStrategy {
        exchange: "bingx",
        content_selector: "[class*=\"dual\"], table",
        extractor_js: r#"
            (() => {
                const rows = document.querySelectorAll('table tbody tr, [class*="product-row"]');
                const out = [];
                rows.forEach((row) => {
                    const cells = row.querySelectorAll('td, [class*="cell"]');
                    const texts = Array.from(cells).map((c) => (c.textContent || '').trim());
                    if (texts.length > 0) {
                        out.push(texts);
                    }
                });
                return out;
            })()
        "#,
        layout: RowLayout::FirstPercent,
        settle: Duration::from_millis(3000),
    },
];

/// Looks up the extraction strategy for a scraped exchange.
pub fn strategy_for(exchange: &str) -> Option<&'static ExtractionStrategy> {
    STRATEGIES.iter().find(|s| s.exchange == exchange)
}

/// Applies the layout: raw cell texts in, labeled rows out.
fn label_rows(layout: RowLayout, rows: Vec<Vec<String>>) -> Vec<RawOffer> {
    let mut out = Vec::new();

    for row in rows {
        match layout {
            RowLayout::Columns {
                apy,
                duration,
                target,
                diff,
            } => {
                let Some(apy_text) = row.get(apy) else {
                    continue;
                };
                out.push(RawOffer::Row(ScrapedRow {
                    apy_text: apy_text.clone(),
                    duration_text: duration.and_then(|i| row.get(i).cloned()),
                    target_text: target.and_then(|i| row.get(i).cloned()),
                    diff_text: diff.and_then(|i| row.get(i).cloned()),
                }));
            }
            RowLayout::FirstPercent => {
                if let Some(cell) = row.iter().find(|c| PERCENT_RE.is_match(c)) {
                    out.push(RawOffer::Row(ScrapedRow {
                        apy_text: cell.clone(),
                        duration_text: None,
                        target_text: None,
                        diff_text: None,
                    }));
                }
            }
        }
    }

    out
}

// --------------------------------------------------
// Collector
// --------------------------------------------------

/// Scrapes one venue per instance, driven by its strategy row.
pub struct ScrapeCollector {
    cfg: ExchangeConfig,
    browser_cfg: BrowserConfig,
    launcher: Arc<dyn BrowserLauncher>,
    strategy: &'static ExtractionStrategy,
    budget: Duration,
}

impl ScrapeCollector {
    pub fn new(
        cfg: ExchangeConfig,
        browser_cfg: BrowserConfig,
        launcher: Arc<dyn BrowserLauncher>,
        strategy: &'static ExtractionStrategy,
        budget: Duration,
    ) -> Self {
        ScrapeCollector {
            cfg,
            browser_cfg,
            launcher,
            strategy,
            budget,
        }
    }

    async fn collect(&self) -> Result<Vec<RawOffer>, CollectError> {
        let url = self
            .cfg
            .page_url
            .as_deref()
            .ok_or_else(|| CollectError::Parse("page_url not configured".to_string()))?;

        let page = self.launcher.open(&self.browser_cfg).await?;

        // The session is closed on the error path too; a leaked
        // browser process outlives the cycle otherwise.
        let result = self.drive(page.as_ref(), url).await;
        page.close().await;

        let rows = result?;
        Ok(label_rows(self.strategy.layout, rows))
    }

    async fn drive(
        &self,
        page: &dyn BrowserPage,
        url: &str,
    ) -> Result<Vec<Vec<String>>, CollectError> {
        let blocked: Vec<ResourceKind> = self
            .browser_cfg
            .blocked_resources
            .iter()
            .filter_map(|s| ResourceKind::parse(s))
            .collect();

        page.block_resource_types(&blocked).await?;
        page.navigate(url).await?;
        page.wait_for_selector(
            self.strategy.content_selector,
            Duration::from_secs(self.browser_cfg.selector_timeout_secs),
        )
        .await?;
        tokio::time::sleep(self.strategy.settle).await;

        page.extract_rows(self.strategy.extractor_js).await
    }
}

#[async_trait::async_trait]
impl Collector for ScrapeCollector {
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
                log::info!("[{}] scraped {} rows", self.cfg.name, raw.len());
                FetchOutcome::ok(&self.cfg.name, raw, started)
            }
            Err(e) => {
                log::warn!("[{}] scrape failed: {}", self.cfg.name, e);
                FetchOutcome::failure(&self.cfg.name, e.to_string(), started)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::config::{Config, SourceKind};

    struct FakePage {
        rows: Vec<Vec<String>>,
        closed: Arc<AtomicBool>,
        selector_found: bool,
    }

    #[async_trait::async_trait]
    impl BrowserPage for FakePage {
        async fn block_resource_types(&self, _kinds: &[ResourceKind]) -> Result<(), CollectError> {
            Ok(())
        }

        async fn navigate(&self, _url: &str) -> Result<(), CollectError> {
            Ok(())
        }

        async fn wait_for_selector(
            &self,
            selector: &str,
            _budget: Duration,
        ) -> Result<(), CollectError> {
            if self.selector_found {
                Ok(())
            } else {
                Err(CollectError::Parse(format!("selector {:?} not found", selector)))
            }
        }

        async fn extract_rows(&self, _js: &str) -> Result<Vec<Vec<String>>, CollectError> {
            Ok(self.rows.clone())
        }

        async fn close(self: Box<Self>) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FakeLauncher {
        rows: Vec<Vec<String>>,
        closed: Arc<AtomicBool>,
        selector_found: bool,
    }

    #[async_trait::async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn open(&self, _cfg: &BrowserConfig) -> Result<Box<dyn BrowserPage>, CollectError> {
            Ok(Box::new(FakePage {
                rows: self.rows.clone(),
                closed: Arc::clone(&self.closed),
                selector_found: self.selector_found,
            }))
        }
    }

    fn collector_with(launcher: FakeLauncher, exchange: &str) -> ScrapeCollector {
        let cfg = ExchangeConfig {
            name: exchange.to_string(),
            enabled: true,
            source: SourceKind::Scrape,
            base_url: None,
            page_url: Some("https://example.com/dual".to_string()),
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            timeout_secs: None,
        };
        // Same strategies with the settle squashed so tests stay fast
        static FAST: Lazy<Vec<ExtractionStrategy>> = Lazy::new(|| {
            STRATEGIES
                .iter()
                .map(|s| ExtractionStrategy {
                    exchange: s.exchange,
                    content_selector: s.content_selector,
                    extractor_js: s.extractor_js,
                    layout: s.layout,
                    settle: Duration::from_millis(0),
                })
                .collect()
        });
        let strategy = FAST.iter().find(|s| s.exchange == exchange).unwrap();

        ScrapeCollector::new(
            cfg,
            Config::default().browser,
            Arc::new(launcher),
            strategy,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn labels_cells_according_to_columns_layout() {
        let closed = Arc::new(AtomicBool::new(false));
        let launcher = FakeLauncher {
            rows: vec![
                vec![
                    "+93.168%".to_string(),
                    "1 Day".to_string(),
                    "94,500".to_string(),
                    "-0.72%".to_string(),
                ],
                vec![
                    "42.5%".to_string(),
                    "3 Days".to_string(),
                    "91,000".to_string(),
                    "-4.40%".to_string(),
                ],
            ],
            closed: Arc::clone(&closed),
            selector_found: true,
        };

        let outcome = collector_with(launcher, "pionex").fetch().await;

        assert!(outcome.success);
        assert_eq!(outcome.raw.len(), 2);
        match &outcome.raw[0] {
            RawOffer::Row(row) => {
                assert_eq!(row.apy_text, "+93.168%");
                assert_eq!(row.duration_text.as_deref(), Some("1 Day"));
                assert_eq!(row.target_text.as_deref(), Some("94,500"));
                assert_eq!(row.diff_text.as_deref(), Some("-0.72%"));
            }
            other => panic!("expected scraped row, got {:?}", other),
        }
        assert!(closed.load(Ordering::SeqCst), "page session must be closed");
    }

    #[tokio::test]
    async fn selector_miss_fails_the_outcome_but_closes_the_page() {
        let closed = Arc::new(AtomicBool::new(false));
        let launcher = FakeLauncher {
            rows: vec![],
            closed: Arc::clone(&closed),
            selector_found: false,
        };

        let outcome = collector_with(launcher, "bitget").fetch().await;

        assert!(!outcome.success);
        assert!(outcome.raw.is_empty());
        assert!(outcome.error.unwrap().contains("not found"));
        assert!(closed.load(Ordering::SeqCst), "page session must be closed");
    }

    #[test]
    fn first_percent_layout_scans_for_the_rate_cell() {
        let rows = vec![
            vec![
                "Subscribe".to_string(),
                "12.5%".to_string(),
                "92,000".to_string(),
            ],
            vec!["BTC".to_string(), "no rate here".to_string()],
        ];

        let raw = label_rows(RowLayout::FirstPercent, rows);

        assert_eq!(raw.len(), 1);
        match &raw[0] {
            RawOffer::Row(row) => {
                assert_eq!(row.apy_text, "12.5%");
                assert_eq!(row.duration_text, None);
            }
            other => panic!("expected scraped row, got {:?}", other),
        }
    }

    #[test]
    fn columns_layout_tolerates_short_rows() {
        let layout = RowLayout::Columns {
            apy: 0,
            duration: Some(1),
            target: Some(2),
            diff: Some(3),
        };
        let rows = vec![
            vec!["50%".to_string(), "2 Days".to_string()],
            vec![],
        ];

        let raw = label_rows(layout, rows);

        // Row without the rate cell disappears entirely
        assert_eq!(raw.len(), 1);
        match &raw[0] {
            RawOffer::Row(row) => {
                assert_eq!(row.apy_text, "50%");
                assert_eq!(row.target_text, None);
            }
            other => panic!("expected scraped row, got {:?}", other),
        }
    }

    #[test]
    fn every_scraped_venue_has_a_strategy() {
        for name in ["pionex", "bybit", "bitget", "bingx"] {
            let s = strategy_for(name).unwrap();
            assert!(!s.content_selector.is_empty());
            assert!(s.extractor_js.contains("querySelectorAll"));
        }
        assert!(strategy_for("binance").is_none());

        assert!(matches!(
            strategy_for("pionex").unwrap().layout,
            RowLayout::Columns { diff: Some(_), .. }
        ));
        assert!(matches!(
            strategy_for("bybit").unwrap().layout,
            RowLayout::Columns { diff: None, .. }
        ));
        assert!(matches!(strategy_for("bitget").unwrap().layout, RowLayout::FirstPercent));
        assert!(matches!(strategy_for("bingx").unwrap().layout, RowLayout::FirstPercent));
    }
}
