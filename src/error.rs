use std::time::Duration;

use thiserror::Error;

/// Failure classes a single collector can produce during one fetch.
///
/// Every variant is local to the collector that raised it: it is
/// converted into a failure-flagged `FetchOutcome` and the cycle
/// continues with the remaining exchanges. Nothing here crosses the
/// orchestrator boundary as an `Err`.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The collector exceeded its per-cycle budget and was cancelled.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure: DNS, refused connection, TLS, or a
    /// non-2xx HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// Response body or page DOM did not match the expected shape
    /// (envelope code rejected, selector not found, regex mismatch).
    #[error("parse error: {0}")]
    Parse(String),

    /// Credentials missing/invalid or the signing step failed.
    #[error("signature error: {0}")]
    Signature(String),

    /// The headless browser could not be started.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),
}

impl From<reqwest::Error> for CollectError {
    fn from(err: reqwest::Error) -> Self {
        // Client-level timeouts are request failures; the Timeout
        // variant is reserved for the orchestrator's cycle budget.
        CollectError::Network(err.to_string())
    }
}
