use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;

/// Retained samples across all operation names (ring buffer).
pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

/// Average duration above which an operation lands in the slow list.
pub const DEFAULT_SLOW_THRESHOLD_MS: f64 = 1_000.0;

#[derive(Debug, Clone)]
pub struct MetricSample {
    pub operation: String,
    pub duration_ms: f64,
    pub recorded_at: Instant,
}

/// Aggregates for one operation name, recomputed on demand from retained
/// samples — never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationStats {
    pub total_operations: usize,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub average_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub p99_duration_ms: f64,
}

#[derive(Debug, Clone)]
pub struct PerfReport {
    pub by_operation: HashMap<String, OperationStats>,
    pub slow_operations: Vec<String>,
}

/// Process-wide latency recorder: paired timers keyed by operation id, plus
/// a bounded sample buffer with nearest-rank percentile stats. Shared state
/// is a timer map (independent per operation id) and a mutexed ring buffer,
/// so concurrent callers never corrupt each other's measurements.
pub struct PerformanceMonitor {
    timers: DashMap<String, Instant>,
    samples: Mutex<VecDeque<MetricSample>>,
    max_samples: usize,
    slow_threshold_ms: f64,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_SAMPLES, DEFAULT_SLOW_THRESHOLD_MS)
    }

    pub fn with_limits(max_samples: usize, slow_threshold_ms: f64) -> Self {
        Self {
            timers: DashMap::new(),
            samples: Mutex::new(VecDeque::new()),
            max_samples: max_samples.max(1),
            slow_threshold_ms,
        }
    }

    pub fn start_timer(&self, operation_id: &str) {
        self.timers.insert(operation_id.to_string(), Instant::now());
    }

    /// Stop the timer for `operation_id` and record the elapsed time under
    /// `operation`. An unknown id is logged and yields 0.0 — a monitor usage
    /// bug must never fail the measured operation.
    pub fn end_timer(&self, operation_id: &str, operation: &str) -> f64 {
        let Some((_, started)) = self.timers.remove(operation_id) else {
            tracing::warn!(operation_id, "end_timer called with no matching start_timer");
            return 0.0;
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record(operation, duration_ms);
        duration_ms
    }

    /// Insert a sample directly, for callers that measure externally.
    pub fn record(&self, operation: &str, duration_ms: f64) {
        let mut samples = self.samples.lock().expect("monitor samples poisoned");
        if samples.len() == self.max_samples {
            samples.pop_front();
        }
        samples.push_back(MetricSample {
            operation: operation.to_string(),
            duration_ms,
            recorded_at: Instant::now(),
        });
    }

    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        let samples = self.samples.lock().expect("monitor samples poisoned");
        let mut durations: Vec<f64> = samples
            .iter()
            .filter(|s| s.operation == operation)
            .map(|s| s.duration_ms)
            .collect();
        if durations.is_empty() {
            return None;
        }
        durations.sort_by(|a, b| a.total_cmp(b));
        Some(stats_from_sorted(&durations))
    }

    /// Stats for every retained operation name, plus the names whose average
    /// exceeds the slow threshold.
    pub fn report(&self) -> PerfReport {
        let samples = self.samples.lock().expect("monitor samples poisoned");
        let mut grouped: HashMap<String, Vec<f64>> = HashMap::new();
        for s in samples.iter() {
            grouped.entry(s.operation.clone()).or_default().push(s.duration_ms);
        }
        drop(samples);

        let mut by_operation = HashMap::new();
        let mut slow_operations = Vec::new();
        for (name, mut durations) in grouped {
            durations.sort_by(|a, b| a.total_cmp(b));
            let stats = stats_from_sorted(&durations);
            if stats.average_duration_ms > self.slow_threshold_ms {
                slow_operations.push(name.clone());
            }
            by_operation.insert(name, stats);
        }
        slow_operations.sort();
        PerfReport {
            by_operation,
            slow_operations,
        }
    }

    /// Drop all retained samples and pending timers.
    pub fn clear(&self) {
        self.timers.clear();
        self.samples.lock().expect("monitor samples poisoned").clear();
    }
}

fn stats_from_sorted(sorted: &[f64]) -> OperationStats {
    let n = sorted.len();
    let sum: f64 = sorted.iter().sum();
    OperationStats {
        total_operations: n,
        min_duration_ms: sorted[0],
        max_duration_ms: sorted[n - 1],
        average_duration_ms: sum / n as f64,
        p95_duration_ms: percentile(sorted, 0.95),
        p99_duration_ms: percentile(sorted, 0.99),
    }
}

/// Nearest-rank percentile: `ceil(p * n) - 1`, clamped to the valid range.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(n - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_ten_samples() {
        let monitor = PerformanceMonitor::new();
        for d in (1..=10).map(|i| (i * 10) as f64) {
            monitor.record("query", d);
        }
        let stats = monitor.stats("query").unwrap();
        assert_eq!(stats.total_operations, 10);
        assert_eq!(stats.min_duration_ms, 10.0);
        assert_eq!(stats.max_duration_ms, 100.0);
        assert_eq!(stats.average_duration_ms, 55.0);
        assert_eq!(stats.p95_duration_ms, 100.0);
        assert_eq!(stats.p99_duration_ms, 100.0);
    }

    #[test]
    fn percentile_ordering_holds() {
        let monitor = PerformanceMonitor::new();
        for d in [3.0, 97.0, 12.0, 45.0, 8.0, 120.0, 66.0] {
            monitor.record("mixed", d);
        }
        let s = monitor.stats("mixed").unwrap();
        assert!(s.min_duration_ms <= s.p95_duration_ms);
        assert!(s.p95_duration_ms <= s.p99_duration_ms);
        assert!(s.p99_duration_ms <= s.max_duration_ms);
    }

    #[test]
    fn single_sample_percentiles() {
        let monitor = PerformanceMonitor::new();
        monitor.record("once", 42.0);
        let s = monitor.stats("once").unwrap();
        assert_eq!(s.p95_duration_ms, 42.0);
        assert_eq!(s.p99_duration_ms, 42.0);
        assert_eq!(s.average_duration_ms, 42.0);
    }

    #[test]
    fn unknown_operation_has_no_stats() {
        let monitor = PerformanceMonitor::new();
        assert!(monitor.stats("never_recorded").is_none());
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let monitor = PerformanceMonitor::with_limits(5, DEFAULT_SLOW_THRESHOLD_MS);
        for d in 1..=8 {
            monitor.record("op", d as f64);
        }
        let s = monitor.stats("op").unwrap();
        // Samples 1..=3 were evicted.
        assert_eq!(s.total_operations, 5);
        assert_eq!(s.min_duration_ms, 4.0);
        assert_eq!(s.max_duration_ms, 8.0);
    }

    #[test]
    fn ring_buffer_cap_spans_operations() {
        let monitor = PerformanceMonitor::with_limits(3, DEFAULT_SLOW_THRESHOLD_MS);
        monitor.record("a", 1.0);
        monitor.record("b", 2.0);
        monitor.record("a", 3.0);
        monitor.record("b", 4.0); // evicts the first "a" sample
        assert_eq!(monitor.stats("a").unwrap().total_operations, 1);
        assert_eq!(monitor.stats("b").unwrap().total_operations, 2);
    }

    #[test]
    fn timer_pairing_by_operation_id() {
        let monitor = PerformanceMonitor::new();
        monitor.start_timer("op-1");
        monitor.start_timer("op-2");
        let d1 = monitor.end_timer("op-1", "fetch");
        let d2 = monitor.end_timer("op-2", "fetch");
        assert!(d1 >= 0.0);
        assert!(d2 >= 0.0);
        assert_eq!(monitor.stats("fetch").unwrap().total_operations, 2);
    }

    #[test]
    fn end_timer_without_start_returns_zero() {
        let monitor = PerformanceMonitor::new();
        let d = monitor.end_timer("ghost", "fetch");
        assert_eq!(d, 0.0);
        assert!(monitor.stats("fetch").is_none());
    }

    #[test]
    fn end_timer_consumes_the_timer() {
        let monitor = PerformanceMonitor::new();
        monitor.start_timer("op");
        let first = monitor.end_timer("op", "fetch");
        let second = monitor.end_timer("op", "fetch");
        assert!(first >= 0.0);
        assert_eq!(second, 0.0);
        assert_eq!(monitor.stats("fetch").unwrap().total_operations, 1);
    }

    #[test]
    fn report_flags_slow_operations() {
        let monitor = PerformanceMonitor::with_limits(100, 50.0);
        monitor.record("fast", 10.0);
        monitor.record("slow", 200.0);
        monitor.record("slow", 300.0);
        let report = monitor.report();
        assert_eq!(report.slow_operations, vec!["slow".to_string()]);
        assert_eq!(report.by_operation.len(), 2);
        assert_eq!(report.by_operation["slow"].average_duration_ms, 250.0);
    }

    #[test]
    fn clear_resets_samples_and_timers() {
        let monitor = PerformanceMonitor::new();
        monitor.start_timer("pending");
        monitor.record("op", 5.0);
        monitor.clear();
        assert!(monitor.stats("op").is_none());
        assert_eq!(monitor.end_timer("pending", "op"), 0.0);
    }

    #[tokio::test]
    async fn concurrent_recording_keeps_every_sample() {
        use std::sync::Arc;
        let monitor = Arc::new(PerformanceMonitor::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let m = monitor.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    m.record("contended", (t * 50 + i) as f64);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(monitor.stats("contended").unwrap().total_operations, 400);
    }
}
