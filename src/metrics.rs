//! Thread-safe metric registry fed by the polling loop
//!
//! Counters, gauges and histograms are keyed by name and updated with atomic
//! operations only, so the metrics server can read while the polling loop
//! writes.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const SESSION_COUNTER: &str = "tune_session_total";
pub const SESSION_DURATION: &str = "tune_session_duration_seconds";
pub const BACKEND_AVAILABLE: &str = "backend_available";
pub const BACKEND_HEALTHY: &str = "backend_healthy";
pub const HEALTH_CHECK_FAILURES: &str = "health_check_failures_total";
pub const LOG_READ_ERRORS: &str = "log_read_errors_total";

/// Destination for metrics derived from health checks and the session log.
///
/// Implementations must be cheap and non-blocking.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str);
    fn set_gauge(&self, name: &str, value: f64);
    fn observe_duration(&self, name: &str, seconds: f64);
}

/// `count` buckets starting at `start`, each `width` apart.
pub fn linear_buckets(start: f64, width: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + width * i as f64).collect()
}

#[derive(Debug)]
struct Histogram {
    bounds: Vec<f64>,
    // Per-bucket counts; the exporter accumulates them.
    counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new(bounds: Vec<f64>) -> Self {
        let counts = bounds.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum_bits: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, value: f64) {
        if let Some(index) = self.bounds.iter().position(|bound| value <= *bound) {
            self.counts[index].fetch_add(1, Ordering::Relaxed);
        }
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0u64;
        let buckets = self
            .bounds
            .iter()
            .zip(&self.counts)
            .map(|(bound, count)| {
                cumulative += count.load(Ordering::Relaxed);
                (*bound, cumulative)
            })
            .collect();

        HistogramSnapshot {
            buckets,
            sum: f64::from_bits(self.sum_bits.load(Ordering::Relaxed)),
            count: self.count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one histogram. Bucket counts are cumulative.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
    pub help: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct MetricsRegistry {
    counters: DashMap<String, AtomicU64>,
    gauges: DashMap<String, AtomicU64>,
    histograms: DashMap<String, Histogram>,
    help: DashMap<String, String>,
    default_buckets: Vec<f64>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            help: DashMap::new(),
            default_buckets: linear_buckets(0.0, 5.0, 10),
        }
    }

    /// Registry with the monitor's metrics declared up front so that they
    /// are exported before the first event arrives.
    pub fn with_defaults() -> Self {
        let registry = Self::new();

        registry.register_counter(SESSION_COUNTER, "Total number of tune sessions");
        registry.register_histogram(
            SESSION_DURATION,
            "Duration of tune sessions in seconds",
            linear_buckets(0.0, 5.0, 10),
        );
        registry.register_gauge(
            BACKEND_AVAILABLE,
            "Backend availability status (1 = available, 0 = unavailable)",
        );
        registry.register_gauge(
            BACKEND_HEALTHY,
            "Result of the last failover health check (1 = ok, 0 = error)",
        );
        registry.register_counter(HEALTH_CHECK_FAILURES, "Health checks where no endpoint was ok");
        registry.register_counter(LOG_READ_ERRORS, "Failed attempts to read the session log");

        registry
    }

    pub fn register_counter(&self, name: &str, help: &str) {
        self.help.insert(name.to_string(), help.to_string());
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0));
    }

    pub fn register_gauge(&self, name: &str, help: &str) {
        self.help.insert(name.to_string(), help.to_string());
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0f64.to_bits()));
    }

    pub fn register_histogram(&self, name: &str, help: &str, bounds: Vec<f64>) {
        self.help.insert(name.to_string(), help.to_string());
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(bounds));
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges
            .get(name)
            .map(|g| f64::from_bits(g.load(Ordering::Relaxed)))
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).map(|h| h.snapshot())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            gauges: self
                .gauges
                .iter()
                .map(|e| (e.key().clone(), f64::from_bits(e.value().load(Ordering::Relaxed))))
                .collect(),
            histograms: self
                .histograms
                .iter()
                .map(|e| (e.key().clone(), e.value().snapshot()))
                .collect(),
            help: self
                .help
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }
}

impl MetricsSink for MetricsRegistry {
    fn increment_counter(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn set_gauge(&self, name: &str, value: f64) {
        if let Some(gauge) = self.gauges.get(name) {
            gauge.store(value.to_bits(), Ordering::Relaxed);
            return;
        }
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0f64.to_bits()))
            .store(value.to_bits(), Ordering::Relaxed);
    }

    fn observe_duration(&self, name: &str, seconds: f64) {
        if let Some(histogram) = self.histograms.get(name) {
            histogram.observe(seconds);
            return;
        }
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(self.default_buckets.clone()))
            .observe(seconds);
    }
}
