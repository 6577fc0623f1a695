use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: batch runs completed. No labels.
pub const BATCHES_TOTAL: &str = "rosterops_batches_total";

/// Histogram: total batch duration in seconds.
pub const BATCH_DURATION_SECONDS: &str = "rosterops_batch_duration_seconds";

/// Counter: items written successfully.
pub const ITEMS_SUCCEEDED_TOTAL: &str = "rosterops_items_succeeded_total";

/// Counter: items that exhausted their retries.
pub const ITEMS_FAILED_TOTAL: &str = "rosterops_items_failed_total";

/// Counter: candidates dropped by the skip strategy.
pub const ITEMS_SKIPPED_TOTAL: &str = "rosterops_items_skipped_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: batch runs currently in flight.
pub const BATCHES_ACTIVE: &str = "rosterops_batches_active";

/// Counter: template cache hits.
pub const CACHE_HITS_TOTAL: &str = "rosterops_cache_hits_total";

/// Counter: template cache misses.
pub const CACHE_MISSES_TOTAL: &str = "rosterops_cache_misses_total";

/// Counter: template cache capacity evictions.
pub const CACHE_EVICTIONS_TOTAL: &str = "rosterops_cache_evictions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
