use std::future::Future;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

use crate::model::{BatchConfig, BatchResult, FailedItem, ItemError};
use crate::monitor::PerformanceMonitor;
use crate::observability;

/// Run N independent mutations with chunked, bounded fan-out.
///
/// Items are split into consecutive chunks of `batch_size` in input order.
/// Chunks run one at a time; within a chunk up to `max_concurrency` items are
/// in flight at once. Each item gets `retry_attempts` extra tries with
/// doubling backoff before landing in `failed`. One item's failure never
/// aborts its siblings. Total elapsed time is recorded in the monitor under
/// `op_name`. Returns only after every chunk has settled.
pub async fn process_batch<T, R, F, Fut>(
    items: Vec<T>,
    processor: F,
    config: &BatchConfig,
    monitor: &PerformanceMonitor,
    op_name: &str,
) -> BatchResult<T, R>
where
    T: Clone + Send,
    R: Send,
    F: Fn(T) -> Fut + Sync,
    Fut: Future<Output = Result<R, ItemError>> + Send,
{
    let batch_size = config.batch_size.max(1);
    let concurrency = config.max_concurrency.max(1);
    let total = items.len();
    let started = Instant::now();
    metrics::gauge!(observability::BATCHES_ACTIVE).increment(1.0);

    let mut successful = Vec::with_capacity(total);
    let mut failed = Vec::new();

    for chunk in items.chunks(batch_size) {
        let outcomes: Vec<_> = stream::iter(chunk.iter().cloned())
            .map(|item| process_one(item, &processor, config.retry_attempts, config.retry_backoff))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        for outcome in outcomes {
            match outcome {
                Ok(pair) => successful.push(pair),
                Err(item) => failed.push(item),
            }
        }
    }

    let elapsed = started.elapsed();
    monitor.record(op_name, elapsed.as_secs_f64() * 1000.0);
    metrics::gauge!(observability::BATCHES_ACTIVE).decrement(1.0);
    metrics::counter!(observability::BATCHES_TOTAL).increment(1);
    metrics::histogram!(observability::BATCH_DURATION_SECONDS).record(elapsed.as_secs_f64());
    metrics::counter!(observability::ITEMS_SUCCEEDED_TOTAL).increment(successful.len() as u64);
    metrics::counter!(observability::ITEMS_FAILED_TOTAL).increment(failed.len() as u64);
    tracing::debug!(
        op = op_name,
        total,
        succeeded = successful.len(),
        failed = failed.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "batch complete"
    );

    BatchResult { successful, failed }
}

/// One item's bounded retry loop. `retries` counts tries beyond the first;
/// backoff doubles per failed try.
async fn process_one<T, R, F, Fut>(
    item: T,
    processor: &F,
    retries: u32,
    backoff: Duration,
) -> Result<(T, R), FailedItem<T>>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, ItemError>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match processor(item.clone()).await {
            Ok(result) => return Ok((item, result)),
            Err(error) => {
                if attempts > retries {
                    return Err(FailedItem { item, error, attempts });
                }
                let delay = backoff.saturating_mul(1 << (attempts - 1).min(16));
                tokio::time::sleep(delay).await;
            }
        }
    }
}
