use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime metrics for the aggregator.
///
/// Purpose:
/// - Track refresh cycle health
/// - Track per-collector success/failure counts
/// - Track offer throughput (collected vs. dropped by validation)
/// - Track serving activity
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // Refresh cycles
    pub cycles_completed: AtomicUsize,
    pub cycles_failed: AtomicUsize,
    pub snapshots_published: AtomicUsize,

    // Collectors
    pub collectors_succeeded: AtomicUsize,
    pub collectors_failed: AtomicUsize,

    // Offers
    pub offers_collected: AtomicUsize,
    pub offers_dropped: AtomicUsize,

    // Serving
    pub http_requests: AtomicUsize,
    pub refresh_kicks: AtomicUsize,
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
