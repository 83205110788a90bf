//! chromiumoxide-backed page sessions
//!
//! One `open` call launches one isolated Chromium process, drives its
//! CDP websocket on a background task, and returns a single page.
//! Resource blocking uses the Fetch domain: only the unwanted
//! resource kinds match an interception pattern, and every paused
//! request is aborted. Everything else loads untouched.
//!
//! Teardown: `close` shuts page, browser and driver down in order.
//! A dropped session (cancelled fetch) still terminates the process,
//! since dropping `Browser` kills the spawned child.

use std::sync::Mutex;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromeLaunchConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{self, EventRequestPaused};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use crate::config::BrowserConfig;
use crate::error::CollectError;

use super::{BrowserLauncher, BrowserPage, ResourceKind};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Production launcher. Stateless; safe to share process-wide.
pub struct ChromiumLauncher;

#[async_trait::async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn open(&self, cfg: &BrowserConfig) -> Result<Box<dyn BrowserPage>, CollectError> {
        let launch_cfg = build_launch_config(cfg)?;

        let (browser, mut handler) = Browser::launch(launch_cfg)
            .await
            .map_err(|e| CollectError::BrowserLaunch(e.to_string()))?;

        // Drives the CDP websocket until the browser goes away.
        let driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                driver.abort();
                return Err(CollectError::BrowserLaunch(format!("opening page: {}", e)));
            }
        };

        // Best effort; an exotic UA string must not sink the fetch.
        if let Err(e) = page.set_user_agent(cfg.user_agent.as_str()).await {
            log::debug!("user-agent override failed: {}", e);
        }

        Ok(Box::new(ChromiumPage {
            browser,
            page,
            driver,
            interceptors: Mutex::new(Vec::new()),
            nav_grace: Duration::from_millis(cfg.nav_grace_ms),
        }))
    }
}

fn build_launch_config(cfg: &BrowserConfig) -> Result<ChromeLaunchConfig, CollectError> {
    let mut builder = ChromeLaunchConfig::builder()
        .window_size(cfg.viewport_width, cfg.viewport_height)
        .viewport(Viewport {
            width: cfg.viewport_width,
            height: cfg.viewport_height,
            ..Viewport::default()
        })
        .request_timeout(Duration::from_secs(cfg.request_timeout_secs))
        .args(["--disable-dev-shm-usage", "--disable-accelerated-2d-canvas"]);

    if !cfg.headless {
        builder = builder.with_head();
    }
    if cfg.no_sandbox {
        builder = builder.no_sandbox().arg("--disable-setuid-sandbox");
    }
    if cfg.disable_gpu {
        builder = builder.arg("--disable-gpu");
    }

    builder.build().map_err(CollectError::BrowserLaunch)
}

fn cdp_resource_type(kind: ResourceKind) -> ResourceType {
    match kind {
        ResourceKind::Image => ResourceType::Image,
        ResourceKind::Stylesheet => ResourceType::Stylesheet,
        ResourceKind::Font => ResourceType::Font,
        ResourceKind::Media => ResourceType::Media,
    }
}

struct ChromiumPage {
    browser: Browser,
    page: Page,
    driver: JoinHandle<()>,
    /// Abort tasks spawned by `block_resource_types`
    interceptors: Mutex<Vec<JoinHandle<()>>>,
    nav_grace: Duration,
}

#[async_trait::async_trait]
impl BrowserPage for ChromiumPage {
    async fn block_resource_types(&self, kinds: &[ResourceKind]) -> Result<(), CollectError> {
        if kinds.is_empty() {
            return Ok(());
        }

        let patterns: Vec<fetch::RequestPattern> = kinds
            .iter()
            .map(|kind| fetch::RequestPattern {
                url_pattern: Some("*".to_string()),
                resource_type: Some(cdp_resource_type(*kind)),
                request_stage: None,
            })
            .collect();

        self.page
            .execute(fetch::EnableParams {
                patterns: Some(patterns),
                handle_auth_requests: None,
            })
            .await
            .map_err(|e| CollectError::Network(format!("enabling request interception: {}", e)))?;

        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| CollectError::Network(format!("listening for paused requests: {}", e)))?;

        // Only the blocked kinds ever pause, so aborting every paused
        // request is exactly the filter we want.
        let page = self.page.clone();
        let aborter = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let fail = fetch::FailRequestParams {
                    request_id: event.request_id.clone(),
                    error_reason: ErrorReason::Aborted,
                };
                if page.execute(fail).await.is_err() {
                    break;
                }
            }
        });

        if let Ok(mut tasks) = self.interceptors.lock() {
            tasks.push(aborter);
        }

        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), CollectError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| CollectError::Network(format!("navigating {}: {}", url, e)))?;

        // Load event is not enough for single-page apps; the settle
        // grace gives late XHR-rendered tables time to fill.
        let _ = self.page.wait_for_navigation().await;
        sleep(self.nav_grace).await;

        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, budget: Duration) -> Result<(), CollectError> {
        let deadline = Instant::now() + budget;

        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CollectError::Parse(format!(
                    "selector {:?} not found within {:?}",
                    selector, budget
                )));
            }
            sleep(SELECTOR_POLL).await;
        }
    }

    async fn extract_rows(&self, extractor_js: &str) -> Result<Vec<Vec<String>>, CollectError> {
        let eval = self
            .page
            .evaluate(extractor_js)
            .await
            .map_err(|e| CollectError::Parse(format!("extraction script failed: {}", e)))?;

        eval.into_value::<Vec<Vec<String>>>()
            .map_err(|e| CollectError::Parse(format!("extraction script returned unexpected shape: {}", e)))
    }

    async fn close(self: Box<Self>) {
        let ChromiumPage {
            mut browser,
            page,
            driver,
            interceptors,
            ..
        } = *self;

        if let Ok(mut tasks) = interceptors.into_inner() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        let _ = page.close().await;

        if browser.close().await.is_err() {
            // Graceful close failed; make sure the process dies.
            let _ = browser.kill().await;
        }
        let _ = browser.wait().await;

        driver.abort();
    }
}
