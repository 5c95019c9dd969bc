//! Polling loop tying health checks and log parsing to the metric sink

use crate::config::{Config, ReadMode};
use crate::errors::Result;
use crate::health::FailoverHealthChecker;
use crate::log_parser::SessionLogParser;
use crate::metrics::{
    MetricsSink, BACKEND_AVAILABLE, BACKEND_HEALTHY, HEALTH_CHECK_FAILURES, LOG_READ_ERRORS,
    SESSION_COUNTER, SESSION_DURATION,
};
use crate::tailer::LogTailer;
use crate::telemetry::{HealthCheckResult, MetricEvent};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Everything one tick observed.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub health: HealthCheckResult,
    pub events: Vec<MetricEvent>,
    pub lines_read: usize,
    /// Set when the log could not be read on this tick.
    pub log_error: Option<String>,
}

/// Drives the health check and log parsing on a fixed period.
pub struct BackendMonitor {
    config: Config,
    checker: FailoverHealthChecker,
    parser: SessionLogParser,
    tailer: LogTailer,
    sink: Arc<dyn MetricsSink>,
    monitor_id: String,
    ticks: u64,
}

impl BackendMonitor {
    pub fn new(
        config: Config,
        checker: FailoverHealthChecker,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let parser = SessionLogParser::new(config.markers.clone());
        let tailer = LogTailer::new(&config.log_path);

        Self {
            config,
            checker,
            parser,
            tailer,
            sink,
            monitor_id: Uuid::new_v4().to_string(),
            ticks: 0,
        }
    }

    pub fn monitor_id(&self) -> &str {
        &self.monitor_id
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until `cancel` fires. Errors inside a tick never end the loop.
    #[instrument(skip(self, cancel), fields(monitor_id = %self.monitor_id))]
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            "Starting backend monitor: {} endpoints, log {}, every {:?}",
            self.config.endpoints.len(),
            self.config.log_path,
            self.config.poll_interval
        );

        let period = self.config.poll_interval;
        let start = Instant::now();
        let mut deadline = start;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep_until(deadline) => {}
            }

            let completed = tokio::select! {
                _ = cancel.cancelled() => false,
                _ = self.run_once() => true,
            };

            if !completed {
                info!("Tick interrupted by shutdown");
                break;
            }

            deadline = next_boundary(start, period, Instant::now());
        }

        info!("Backend monitor stopped after {} ticks", self.ticks);
    }

    /// Execute a single tick: health check, log read, metric forwarding.
    pub async fn run_once(&mut self) -> TickReport {
        self.ticks += 1;

        let health = self.checker.check(&self.config.endpoints).await;
        self.record_health(&health);

        let (events, lines_read, log_error) = match self.read_log().await {
            Ok((events, lines_read)) => (events, lines_read, None),
            Err(e) => {
                error!("Error reading log file {}: {}", self.config.log_path, e);
                self.sink.increment_counter(LOG_READ_ERRORS);
                (Vec::new(), 0, Some(e.to_string()))
            }
        };

        for event in &events {
            self.forward(event);
        }

        if !events.is_empty() {
            debug!("Forwarded {} events from {} lines", events.len(), lines_read);
        }

        TickReport {
            health,
            events,
            lines_read,
            log_error,
        }
    }

    fn record_health(&self, health: &HealthCheckResult) {
        if health.is_ok() {
            info!(
                endpoint = health.endpoint.as_deref().unwrap_or("-"),
                "Backend healthy: {}", health.detail
            );
            self.sink.set_gauge(BACKEND_HEALTHY, 1.0);
        } else {
            warn!(
                endpoint = health.endpoint.as_deref().unwrap_or("-"),
                "Backend unhealthy: {}", health.detail
            );
            self.sink.set_gauge(BACKEND_HEALTHY, 0.0);
            self.sink.increment_counter(HEALTH_CHECK_FAILURES);
        }
    }

    async fn read_log(&mut self) -> Result<(Vec<MetricEvent>, usize)> {
        let batch = if self.config.read_mode == ReadMode::Rescan {
            self.parser.reset();
            self.tailer.read_all_lines().await?
        } else {
            self.tailer.read_new_lines().await?
        };
        if batch.rotated {
            info!("Log file {} was rotated, resetting session state", self.config.log_path);
            self.parser.reset();
        }

        let lines_read = batch.lines.len();
        let events = self.parser.process_lines(&batch.lines);
        Ok((events, lines_read))
    }

    fn forward(&self, event: &MetricEvent) {
        match event {
            MetricEvent::SessionStarted => {
                info!("Fine-tune session started");
                self.sink.increment_counter(SESSION_COUNTER);
            }
            MetricEvent::SessionEnded { duration_secs } => {
                info!("Fine-tune session ended (duration {:.2}s)", duration_secs);
                self.sink.observe_duration(SESSION_DURATION, *duration_secs);
            }
            MetricEvent::AvailabilitySample { value } => {
                debug!("Backend availability sample: {}", value);
                self.sink.set_gauge(BACKEND_AVAILABLE, *value);
            }
        }
    }
}

/// First multiple of `period` after `start` that is later than `now`.
/// Boundaries that passed while a tick was running are skipped.
fn next_boundary(start: Instant, period: Duration, now: Instant) -> Instant {
    let period_nanos = period.as_nanos().max(1);
    let elapsed = now.saturating_duration_since(start).as_nanos();
    let periods = elapsed / period_nanos + 1;
    let offset = periods.saturating_mul(period_nanos).min(u64::MAX as u128) as u64;
    start + Duration::from_nanos(offset)
}
