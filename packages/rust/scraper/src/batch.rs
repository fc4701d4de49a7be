//! Deadline-aware batched fan-out.
//!
//! Items are processed in batches of `batch_size`. Every batch member runs as
//! a spawned task gated by a semaphore; the batch is joined with all-settle
//! semantics before the next one starts. A task that yields `None`, errors,
//! or panics contributes nothing and never affects its siblings.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use prodscout_shared::{Deadline, ProgressSink, RequestSettings};

/// How a fan-out is paced and reported.
#[derive(Debug, Clone, Copy)]
pub struct BatchPlan<'a> {
    pub batch_size: usize,
    pub delay: Duration,
    pub deadline: &'a Deadline,
    pub progress: &'a ProgressSink,
    pub stage: &'a str,
}

impl<'a> BatchPlan<'a> {
    pub fn new(
        request: &RequestSettings,
        deadline: &'a Deadline,
        progress: &'a ProgressSink,
        stage: &'a str,
    ) -> Self {
        Self {
            batch_size: request.batch_size.max(1),
            delay: request.delay,
            deadline,
            progress,
            stage,
        }
    }
}

/// Run `task` over every item, batch by batch, until done or the deadline
/// passes. Results come back in item order.
pub async fn run_batches<I, T, F, Fut>(items: Vec<I>, plan: &BatchPlan<'_>, task: F) -> Vec<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Option<T>> + Send + 'static,
{
    let total = items.len();
    let batch_size = plan.batch_size.max(1);
    let semaphore = Arc::new(Semaphore::new(batch_size));
    let mut results: Vec<T> = Vec::with_capacity(total);
    let mut processed = 0usize;
    let mut pending = items.into_iter().peekable();

    while pending.peek().is_some() {
        if plan.deadline.is_expired() {
            warn!(
                stage = plan.stage,
                processed,
                skipped = total - processed,
                "time budget exhausted, returning partial results"
            );
            break;
        }

        let batch: Vec<I> = pending.by_ref().take(batch_size).collect();
        let mut handles = Vec::with_capacity(batch.len());
        for item in batch {
            let sem = semaphore.clone();
            let fut = task(item);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok()?;
                fut.await
            }));
        }

        for handle in handles {
            processed += 1;
            match handle.await {
                Ok(Some(value)) => results.push(value),
                Ok(None) => {}
                Err(e) => warn!(stage = plan.stage, error = %e, "batch task failed"),
            }
        }

        debug!(stage = plan.stage, processed, total, found = results.len(), "batch joined");
        plan.progress.counts(plan.stage, processed, total, results.len());

        if pending.peek().is_some() && !plan.delay.is_zero() {
            tokio::time::sleep(plan.delay).await;
        }
    }

    results
}
