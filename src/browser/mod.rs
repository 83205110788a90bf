//! Headless-browser capability layer
//!
//! Scrape collectors never talk to a browser library directly. They
//! drive a page session through the two traits below, which cover
//! exactly the operations scraping needs:
//!
//! - block resource types
//! - navigate
//! - wait for a content selector
//! - evaluate an in-page extraction routine
//! - close
//!
//! The production implementation lives in `chromium.rs` (CDP via
//! chromiumoxide); tests substitute an in-memory fake. Launch flags,
//! viewport and user agent are plain `BrowserConfig` values applied
//! at session open, invisible to collectors.

pub mod chromium;

use std::time::Duration;

use crate::config::BrowserConfig;
use crate::error::CollectError;

/// Resource classes that can be aborted during page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
    Media,
}

impl ResourceKind {
    /// Parses a configuration string. Unknown strings yield `None`
    /// and are reported by the caller.
    pub fn parse(s: &str) -> Option<ResourceKind> {
        match s {
            "image" => Some(ResourceKind::Image),
            "stylesheet" => Some(ResourceKind::Stylesheet),
            "font" => Some(ResourceKind::Font),
            "media" => Some(ResourceKind::Media),
            _ => None,
        }
    }
}

/// One live page session.
///
/// CONTRACT:
/// - A session belongs to exactly one collector fetch; it is never
///   shared or reused. `Sync` is still required: the owning fetch
///   future holds `&dyn BrowserPage` across awaits inside a spawned
///   task.
/// - `close` is the graceful teardown path. Dropping a session
///   without calling it must still terminate the underlying browser
///   process (cancelled fetches drop mid-flight).
/// - Methods must never panic; every failure maps to a
///   `CollectError` the collector converts into its outcome.
#[async_trait::async_trait]
pub trait BrowserPage: Send + Sync {
    /// Aborts all subsequent requests for the given resource kinds.
    /// Must be called before `navigate` to take effect for the
    /// initial page load.
    async fn block_resource_types(&self, kinds: &[ResourceKind]) -> Result<(), CollectError>;

    /// Navigates and waits for the page to load plus the configured
    /// settle grace.
    async fn navigate(&self, url: &str) -> Result<(), CollectError>;

    /// Waits until `selector` matches an element, polling up to
    /// `budget`. A miss is a `Parse` error (the DOM did not take the
    /// expected shape).
    async fn wait_for_selector(&self, selector: &str, budget: Duration) -> Result<(), CollectError>;

    /// Runs an in-page extraction routine. The routine must evaluate
    /// to an array of rows, each row an array of cell strings.
    async fn extract_rows(&self, extractor_js: &str) -> Result<Vec<Vec<String>>, CollectError>;

    /// Graceful teardown: page, browser, driver task.
    async fn close(self: Box<Self>);
}

/// Opens page sessions. One launcher is shared process-wide; every
/// `open` yields an isolated browser process.
#[async_trait::async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self, cfg: &BrowserConfig) -> Result<Box<dyn BrowserPage>, CollectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_kind_parses_config_strings() {
        assert_eq!(ResourceKind::parse("image"), Some(ResourceKind::Image));
        assert_eq!(ResourceKind::parse("stylesheet"), Some(ResourceKind::Stylesheet));
        assert_eq!(ResourceKind::parse("font"), Some(ResourceKind::Font));
        assert_eq!(ResourceKind::parse("media"), Some(ResourceKind::Media));
        assert_eq!(ResourceKind::parse("script"), None);
        assert_eq!(ResourceKind::parse(""), None);
    }

    #[test]
    fn page_sessions_are_shareable_across_task_boundaries() {
        fn shareable<T: Send + Sync + ?Sized>() {}
        shareable::<dyn BrowserPage>();
        shareable::<dyn BrowserLauncher>();
    }
}
