//! Resource-subsystem counters (spec.md §4.9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Min/max/total/mean latency for one kind of operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub total_ms: u64,
    pub mean_ms: f64,
}

impl LatencyStats {
    fn record(&mut self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.min_ms = if self.count == 0 { ms } else { self.min_ms.min(ms) };
        self.max_ms = self.max_ms.max(ms);
        self.total_ms = self.total_ms.saturating_add(ms);
        self.count += 1;
        self.mean_ms = self.total_ms as f64 / self.count as f64;
    }
}

/// A point-in-time snapshot of [`ResourceMetrics`]' counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub reads: u64,
    pub read_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub watch_events: u64,
    pub uptime_secs: u64,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub read_latency: LatencyStats,
    pub size_by_uri: HashMap<String, u64>,
    pub errors_by_type: HashMap<String, u64>,
    pub errors_by_uri: HashMap<String, u64>,
}

#[derive(Default)]
struct Breakdowns {
    size_by_uri: HashMap<String, u64>,
    errors_by_type: HashMap<String, u64>,
    errors_by_uri: HashMap<String, u64>,
    read_latency: LatencyStats,
}

/// Process-lifetime counters for resource access (spec.md §4.9): total and
/// per-error/per-URI breakdowns guarded by one mutex, since the
/// cardinality (distinct URIs/error kinds in a deployment) stays low
/// enough that lock contention is not a concern; the plain running
/// counters stay lock-free atomics.
pub struct ResourceMetrics {
    reads: AtomicU64,
    read_errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    watch_events: AtomicU64,
    started_at: Instant,
    breakdowns: Mutex<Breakdowns>,
}

impl Default for ResourceMetrics {
    fn default() -> Self {
        Self {
            reads: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            watch_events: AtomicU64::new(0),
            started_at: Instant::now(),
            breakdowns: Mutex::new(Breakdowns::default()),
        }
    }
}

impl ResourceMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful read of `uri` that took `elapsed` and
    /// produced `size_bytes`.
    pub fn record_read(&self, uri: &str, size_bytes: u64, elapsed: Duration) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut breakdowns) = self.breakdowns.lock() {
            breakdowns.read_latency.record(elapsed);
            breakdowns.size_by_uri.insert(uri.to_string(), size_bytes);
        }
    }

    /// Records a failed read of `uri`, classified by `error_type` (e.g.
    /// `"not_found"`, `"io"`).
    pub fn record_read_error(&self, uri: &str, error_type: &str) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut breakdowns) = self.breakdowns.lock() {
            *breakdowns.errors_by_type.entry(error_type.to_string()).or_insert(0) += 1;
            *breakdowns.errors_by_uri.entry(uri.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watch_event(&self) {
        self.watch_events.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let reads = self.reads.load(Ordering::Relaxed);
        let read_errors = self.read_errors.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let total = reads + read_errors;
        let cache_total = cache_hits + cache_misses;
        let (read_latency, size_by_uri, errors_by_type, errors_by_uri) = self
            .breakdowns
            .lock()
            .map(|b| {
                (
                    b.read_latency.clone(),
                    b.size_by_uri.clone(),
                    b.errors_by_type.clone(),
                    b.errors_by_uri.clone(),
                )
            })
            .unwrap_or_default();

        MetricsSnapshot {
            reads,
            read_errors,
            cache_hits,
            cache_misses,
            watch_events: self.watch_events.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
            success_rate: if total == 0 { 0.0 } else { reads as f64 / total as f64 },
            cache_hit_rate: if cache_total == 0 {
                0.0
            } else {
                cache_hits as f64 / cache_total as f64
            },
            read_latency,
            size_by_uri,
            errors_by_type,
            errors_by_uri,
        }
    }

    /// Resets every counter and breakdown to zero without resetting
    /// `started_at`.
    pub fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.watch_events.store(0, Ordering::Relaxed);
        if let Ok(mut breakdowns) = self.breakdowns.lock() {
            *breakdowns = Breakdowns::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = ResourceMetrics::new();
        metrics.record_read("a", 5, Duration::from_millis(1));
        metrics.record_read("b", 7, Duration::from_millis(3));
        metrics.record_cache_hit();
        let snap = metrics.snapshot();
        assert_eq!(snap.reads, 2);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.size_by_uri.get("a"), Some(&5));
        assert_eq!(snap.size_by_uri.get("b"), Some(&7));
        assert_eq!(snap.read_latency.count, 2);
    }

    #[test]
    fn read_errors_are_broken_down_by_type_and_uri() {
        let metrics = ResourceMetrics::new();
        metrics.record_read_error("file:///a.txt", "not_found");
        metrics.record_read_error("file:///a.txt", "not_found");
        metrics.record_read_error("file:///b.txt", "io");
        let snap = metrics.snapshot();
        assert_eq!(snap.read_errors, 3);
        assert_eq!(snap.errors_by_type.get("not_found"), Some(&2));
        assert_eq!(snap.errors_by_type.get("io"), Some(&1));
        assert_eq!(snap.errors_by_uri.get("file:///a.txt"), Some(&2));
    }

    #[test]
    fn latency_stats_track_min_max_mean() {
        let metrics = ResourceMetrics::new();
        metrics.record_read("a", 1, Duration::from_millis(10));
        metrics.record_read("a", 1, Duration::from_millis(30));
        let snap = metrics.snapshot();
        assert_eq!(snap.read_latency.min_ms, 10);
        assert_eq!(snap.read_latency.max_ms, 30);
        assert!((snap.read_latency.mean_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_zeroes_counters_and_breakdowns() {
        let metrics = ResourceMetrics::new();
        metrics.record_read("a", 1, Duration::from_millis(1));
        metrics.record_read_error("a", "io");
        metrics.reset();
        let snap = metrics.snapshot();
        assert_eq!(snap.reads, 0);
        assert!(snap.size_by_uri.is_empty());
        assert!(snap.errors_by_type.is_empty());
    }
}
