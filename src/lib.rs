//! Backend Health Monitor Library
//!
//! Probes a prioritized list of backend health endpoints, tails the session
//! log the backends write, and turns both into Prometheus metrics.

pub mod config;
pub mod errors;
pub mod exporter;
pub mod health;
pub mod log_parser;
pub mod metrics;
pub mod monitor;
pub mod prober;
pub mod server;
pub mod tailer;
pub mod telemetry;

pub use config::{Config, ReadMode};
pub use errors::{MonitorError, Result};
pub use exporter::PrometheusExporter;
pub use health::FailoverHealthChecker;
pub use log_parser::{LogMarkers, SessionLogParser};
pub use metrics::{MetricsRegistry, MetricsSink};
pub use monitor::{BackendMonitor, TickReport};
pub use prober::{EndpointProber, HttpProber};
pub use telemetry::{HealthCheckResult, HealthStatus, MetricEvent};
