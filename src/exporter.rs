//! Prometheus text exposition of the metric registry

use crate::metrics::{HistogramSnapshot, MetricsRegistry};
use std::sync::Arc;

pub struct PrometheusExporter {
    registry: Arc<MetricsRegistry>,
    namespace: String,
}

impl PrometheusExporter {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self::with_namespace(registry, "")
    }

    /// Prefix every exported name with `namespace_` unless it is empty.
    pub fn with_namespace(registry: Arc<MetricsRegistry>, namespace: impl Into<String>) -> Self {
        Self {
            registry,
            namespace: namespace.into(),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let snapshot = self.registry.snapshot();
        let mut output = String::new();

        for (name, value) in &snapshot.counters {
            self.write_header(&mut output, name, snapshot.help.get(name), "counter");
            output.push_str(&format!("{} {}\n", self.full_name(name), value));
        }

        for (name, value) in &snapshot.gauges {
            self.write_header(&mut output, name, snapshot.help.get(name), "gauge");
            output.push_str(&format!("{} {}\n", self.full_name(name), value));
        }

        for (name, histogram) in &snapshot.histograms {
            self.write_header(&mut output, name, snapshot.help.get(name), "histogram");
            self.write_histogram(&mut output, name, histogram);
        }

        output
    }

    fn full_name(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.namespace, name)
        }
    }

    fn write_header(&self, output: &mut String, name: &str, help: Option<&String>, kind: &str) {
        let full_name = self.full_name(name);
        if let Some(help) = help {
            output.push_str(&format!("# HELP {} {}\n", full_name, help));
        }
        output.push_str(&format!("# TYPE {} {}\n", full_name, kind));
    }

    fn write_histogram(&self, output: &mut String, name: &str, histogram: &HistogramSnapshot) {
        let full_name = self.full_name(name);

        for (bound, count) in &histogram.buckets {
            output.push_str(&format!("{}_bucket{{le=\"{}\"}} {}\n", full_name, bound, count));
        }
        output.push_str(&format!(
            "{}_bucket{{le=\"+Inf\"}} {}\n",
            full_name, histogram.count
        ));
        output.push_str(&format!("{}_sum {}\n", full_name, histogram.sum));
        output.push_str(&format!("{}_count {}\n", full_name, histogram.count));
    }
}
