//! Prometheus text format exporter.
//!
//! Encodes a [`MetricsSnapshot`] into the [Prometheus exposition format](https://prometheus.io/docs/instrumenting/exposition_formats/)
//! (text/plain; version=0.0.4). Every metric name is prefixed with `quorum_`.
//!
//! ## Usage
//!
//! ```rust
//! use quorum_monitoring::{prometheus, MetricDesc, MetricsRegistry, MetricsSink};
//!
//! static DROPPED: MetricDesc = MetricDesc::new("router_dropped_responses", "Unmatched responses");
//!
//! let registry = MetricsRegistry::new();
//! registry.add_counter(&DROPPED, 42);
//!
//! let text = prometheus::encode(&registry.snapshot());
//! assert!(text.contains("quorum_router_dropped_responses 42"));
//! ```

use crate::MetricsSnapshot;

const PREFIX: &str = "quorum_";

/// Encode a metrics snapshot into Prometheus text exposition format.
pub fn encode(snap: &MetricsSnapshot) -> String {
    let mut out = String::with_capacity(4096);

    for (name, help, value) in &snap.counters {
        write_counter(&mut out, &format!("{PREFIX}{name}"), help, *value);
    }
    for (name, help, value) in &snap.gauges {
        write_gauge(&mut out, &format!("{PREFIX}{name}"), help, *value);
    }
    for histogram in &snap.histograms {
        write_histogram(
            &mut out,
            &format!("{PREFIX}{}", histogram.name),
            histogram.help,
            &histogram.buckets,
            histogram.sum,
            histogram.count,
        );
    }

    out
}

// ---------------------------------------------------------------------------
// Helper writers
// ---------------------------------------------------------------------------

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} counter\n"));
    out.push_str(&format!("{name} {value}\n\n"));
}

fn write_gauge(out: &mut String, name: &str, help: &str, value: i64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name} {value}\n\n"));
}

fn write_histogram(
    out: &mut String,
    name: &str,
    help: &str,
    buckets: &[(f64, u64)],
    sum: f64,
    count: u64,
) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} histogram\n"));

    for (bound, cumulative_count) in buckets {
        if bound.is_infinite() {
            out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {cumulative_count}\n"));
        } else {
            out.push_str(&format!("{name}_bucket{{le=\"{bound}\"}} {cumulative_count}\n"));
        }
    }
    // Always include +Inf bucket
    out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {count}\n"));
    out.push_str(&format!("{name}_sum {sum}\n"));
    out.push_str(&format!("{name}_count {count}\n\n"));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
