//! Refresh-cycle orchestration
//!
//! One call to `fetch_all` is one cycle: every enabled collector
//! runs on its own task, bounded by its own budget, and the cycle
//! ends only when each of them produced an outcome.

use std::sync::atomic::Ordering;
use std::time::Instant;

use tokio::time::timeout;

use crate::error::CollectError;
use crate::exchanges::collector::Collector;
use crate::metrics::METRICS;
use crate::schema::FetchOutcome;

/// Runs all collectors of one cycle concurrently and waits for every
/// one of them.
///
/// CONTRACT:
/// - Exactly one outcome per collector, in input order
/// - A collector overrunning its budget is cancelled and recorded as
///   a timeout failure
/// - A panicking collector is recorded as a failure; the panic never
///   unwinds into the cycle
///
/// This function does NOT:
/// - Retry failed collectors (the next cycle is the retry)
/// - Interpret raw offers (delegated to the normalizer)
///
pub async fn fetch_all(collectors: Vec<Box<dyn Collector>>) -> Vec<FetchOutcome> {
    let cycle_started = Instant::now();
    let mut handles = Vec::with_capacity(collectors.len());

    for collector in collectors {
        let exchange = collector.exchange().to_string();
        let budget = collector.budget();

        let task_exchange = exchange.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            match timeout(budget, collector.fetch()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // The fetch future was dropped mid-flight; its own
                    // logging never ran, so the cancellation is
                    // reported here.
                    log::warn!("[orchestrator] {} exceeded its {:?} budget", task_exchange, budget);
                    FetchOutcome::failure(
                        &task_exchange,
                        CollectError::Timeout(budget).to_string(),
                        started,
                    )
                }
            }
        });

        handles.push((exchange, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (exchange, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("[orchestrator] collector task for {} crashed: {}", exchange, e);
                FetchOutcome::failure(
                    &exchange,
                    format!("collector task crashed: {}", e),
                    cycle_started,
                )
            }
        };

        if outcome.success {
            METRICS.collectors_succeeded.fetch_add(1, Ordering::Relaxed);
            METRICS
                .offers_collected
                .fetch_add(outcome.raw.len(), Ordering::Relaxed);
        } else {
            METRICS.collectors_failed.fetch_add(1, Ordering::Relaxed);
        }

        outcomes.push(outcome);
    }

    let ok = outcomes.iter().filter(|o| o.success).count();
    log::info!(
        "[orchestrator] cycle finished: {}/{} collectors ok, {} raw offers, {} ms",
        ok,
        outcomes.len(),
        outcomes.iter().map(|o| o.raw.len()).sum::<usize>(),
        cycle_started.elapsed().as_millis()
    );

    outcomes
}
