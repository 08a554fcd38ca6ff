//! # Quorum Monitoring
//!
//! Metrics for the networking substrate. Components never own concrete
//! metrics: they report into an `Arc<dyn MetricsSink>`, which is either the
//! in-process [`MetricsRegistry`] or [`NoopMetrics`].
//!
//! Three metric types matching Prometheus conventions:
//! - **Counter**: monotonically increasing value (e.g., gossip bytes sent)
//! - **Gauge**: value that can go up or down (e.g., pending requests)
//! - **Histogram**: distribution of observations (e.g., processing time)
//!
//! ## Usage
//!
//! ```rust
//! use quorum_monitoring::{MetricDesc, MetricsRegistry, MetricsSink};
//!
//! static SENT: MetricDesc = MetricDesc::new("gossip_sent_count", "Gossip messages sent");
//!
//! let registry = MetricsRegistry::new();
//! registry.inc_counter(&SENT);
//! assert_eq!(registry.counter("gossip_sent_count"), 1);
//!
//! let prom_text = quorum_monitoring::prometheus::encode(&registry.snapshot());
//! assert!(prom_text.contains("gossip_sent_count 1"));
//! ```

pub mod prometheus;

use {
    parking_lot::Mutex,
    std::{
        collections::BTreeMap,
        sync::{
            atomic::{AtomicI64, AtomicU64, Ordering},
            Arc,
        },
    },
};

// ---------------------------------------------------------------------------
// Metric primitives
// ---------------------------------------------------------------------------

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a value to the counter.
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    /// Get the current counter value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can go up or down.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub const fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }

    /// Set the gauge to an absolute value.
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Add a value to the gauge.
    pub fn add(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    /// Get the current gauge value.
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A histogram that collects observations into configurable buckets.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum: Mutex<f64>,
    count: AtomicU64,
}

impl Histogram {
    /// Create a histogram with the given bucket upper bounds.
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: Mutex::new(0.0),
            count: AtomicU64::new(0),
        }
    }

    /// Observe a value, adding it to the appropriate bucket(s).
    pub fn observe(&self, v: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        {
            let mut sum = self.sum.lock();
            *sum += v;
        }
        for (i, bound) in self.buckets.iter().enumerate() {
            if v <= *bound {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get the total number of observations.
    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the sum of all observations.
    pub fn get_sum(&self) -> f64 {
        *self.sum.lock()
    }

    /// Get bucket counts.
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .zip(self.counts.iter())
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Default buckets for timing histograms (milliseconds).
pub fn default_time_buckets() -> Vec<f64> {
    vec![
        0.1, 0.5, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
    ]
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Static description of a metric. Declared once, next to the code that
/// reports it.
#[derive(Debug)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
}

impl MetricDesc {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self { name, help }
    }
}

/// Where components report metrics.
pub trait MetricsSink: Send + Sync {
    fn add_counter(&self, metric: &'static MetricDesc, value: u64);

    fn set_gauge(&self, metric: &'static MetricDesc, value: i64);

    /// Record one histogram observation (milliseconds for timings).
    fn observe(&self, metric: &'static MetricDesc, value: f64);

    fn inc_counter(&self, metric: &'static MetricDesc) {
        self.add_counter(metric, 1);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl NoopMetrics {
    pub fn shared() -> Arc<dyn MetricsSink> {
        Arc::new(Self)
    }
}

impl MetricsSink for NoopMetrics {
    fn add_counter(&self, _metric: &'static MetricDesc, _value: u64) {}

    fn set_gauge(&self, _metric: &'static MetricDesc, _value: i64) {}

    fn observe(&self, _metric: &'static MetricDesc, _value: f64) {}
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Creates metrics on first report and keeps them for export.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: Mutex<BTreeMap<&'static str, (&'static str, Arc<Counter>)>>,
    gauges: Mutex<BTreeMap<&'static str, (&'static str, Arc<Gauge>)>>,
    histograms: Mutex<BTreeMap<&'static str, (&'static str, Arc<Histogram>)>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter_handle(&self, metric: &'static MetricDesc) -> Arc<Counter> {
        self.counters
            .lock()
            .entry(metric.name)
            .or_insert_with(|| (metric.help, Arc::new(Counter::new())))
            .1
            .clone()
    }

    fn gauge_handle(&self, metric: &'static MetricDesc) -> Arc<Gauge> {
        self.gauges
            .lock()
            .entry(metric.name)
            .or_insert_with(|| (metric.help, Arc::new(Gauge::new())))
            .1
            .clone()
    }

    fn histogram_handle(&self, metric: &'static MetricDesc) -> Arc<Histogram> {
        self.histograms
            .lock()
            .entry(metric.name)
            .or_insert_with(|| (metric.help, Arc::new(Histogram::new(default_time_buckets()))))
            .1
            .clone()
    }

    /// Current value of a counter; 0 if it was never reported.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .get(name)
            .map_or(0, |(_, counter)| counter.get())
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges
            .lock()
            .get(name)
            .map_or(0, |(_, gauge)| gauge.get())
    }

    pub fn histogram_count(&self, name: &str) -> u64 {
        self.histograms
            .lock()
            .get(name)
            .map_or(0, |(_, histogram)| histogram.get_count())
    }

    /// Take a point-in-time snapshot of every metric for export.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .lock()
                .iter()
                .map(|(name, (help, c))| (*name, *help, c.get()))
                .collect(),
            gauges: self
                .gauges
                .lock()
                .iter()
                .map(|(name, (help, g))| (*name, *help, g.get()))
                .collect(),
            histograms: self
                .histograms
                .lock()
                .iter()
                .map(|(name, (help, h))| HistogramSnapshot {
                    name,
                    help,
                    buckets: h.get_buckets(),
                    sum: h.get_sum(),
                    count: h.get_count(),
                })
                .collect(),
        }
    }
}

impl MetricsSink for MetricsRegistry {
    fn add_counter(&self, metric: &'static MetricDesc, value: u64) {
        self.counter_handle(metric).add(value);
    }

    fn set_gauge(&self, metric: &'static MetricDesc, value: i64) {
        self.gauge_handle(metric).set(value);
    }

    fn observe(&self, metric: &'static MetricDesc, value: f64) {
        self.histogram_handle(metric).observe(value);
    }
}

// ---------------------------------------------------------------------------
// Snapshot (point-in-time export)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    pub name: &'static str,
    pub help: &'static str,
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

/// Every registered metric, sorted by name within each kind.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub counters: Vec<(&'static str, &'static str, u64)>,
    pub gauges: Vec<(&'static str, &'static str, i64)>,
    pub histograms: Vec<HistogramSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    static SENT: MetricDesc = MetricDesc::new("test_sent", "test counter");
    static PENDING: MetricDesc = MetricDesc::new("test_pending", "test gauge");
    static LATENCY: MetricDesc = MetricDesc::new("test_latency_ms", "test histogram");

    #[test]
    fn test_counter() {
        let c = Counter::new();
        assert_eq!(c.get(), 0);
        c.inc();
        assert_eq!(c.get(), 1);
        c.add(5);
        assert_eq!(c.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let g = Gauge::new();
        assert_eq!(g.get(), 0);
        g.set(42);
        assert_eq!(g.get(), 42);
        g.add(-10);
        assert_eq!(g.get(), 32);
    }

    #[test]
    fn test_histogram() {
        let h = Histogram::new(vec![10.0, 50.0, 100.0]);
        h.observe(5.0);
        h.observe(25.0);
        h.observe(75.0);
        h.observe(150.0);

        assert_eq!(h.get_count(), 4);
        assert!((h.get_sum() - 255.0).abs() < 1e-6);

        let buckets = h.get_buckets();
        assert_eq!(buckets[0], (10.0, 1)); // 5.0 ≤ 10
        assert_eq!(buckets[1], (50.0, 2)); // 5.0, 25.0 ≤ 50
        assert_eq!(buckets[2], (100.0, 3)); // 5.0, 25.0, 75.0 ≤ 100
    }

    #[test]
    fn test_registry_creates_on_first_report() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.counter("test_sent"), 0);
        registry.inc_counter(&SENT);
        registry.add_counter(&SENT, 4);
        registry.set_gauge(&PENDING, 3);
        registry.observe(&LATENCY, 12.0);

        assert_eq!(registry.counter("test_sent"), 5);
        assert_eq!(registry.gauge("test_pending"), 3);
        assert_eq!(registry.histogram_count("test_latency_ms"), 1);

        let snap = registry.snapshot();
        assert_eq!(snap.counters, vec![("test_sent", "test counter", 5)]);
        assert_eq!(snap.gauges, vec![("test_pending", "test gauge", 3)]);
        assert_eq!(snap.histograms.len(), 1);
    }

    #[test]
    fn test_noop_sink_accepts_everything() {
        let sink = NoopMetrics::shared();
        sink.inc_counter(&SENT);
        sink.set_gauge(&PENDING, 1);
        sink.observe(&LATENCY, 1.0);
    }
}
