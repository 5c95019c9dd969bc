//! Backend Health Monitor Binary

use backend_monitor::server::start_metrics_server;
use backend_monitor::{
    BackendMonitor, Config, FailoverHealthChecker, HttpProber, MetricsRegistry, MonitorError,
    PrometheusExporter, Result,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "backend_monitor", version, about = "Backend health and session log monitor")]
struct Cli {
    /// Session log file to tail
    #[arg(long, env = "MONITOR_LOG_PATH")]
    log_path: Option<String>,

    /// Health endpoint, in priority order (repeatable or comma-separated)
    #[arg(long = "endpoint", env = "MONITOR_ENDPOINTS", value_delimiter = ',')]
    endpoints: Vec<String>,

    /// Seconds between polling ticks
    #[arg(long, env = "POLL_INTERVAL_SECONDS")]
    interval_secs: Option<u64>,

    /// Listen address for the metrics server
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Run a single tick, print the report as JSON and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(log_path) = &self.log_path {
            config.log_path = log_path.clone();
        }
        if !self.endpoints.is_empty() {
            config.endpoints = self.endpoints.clone();
        }
        if let Some(seconds) = self.interval_secs {
            config.poll_interval = Duration::from_secs(seconds);
        }
        if let Some(addr) = &self.metrics_addr {
            config.metrics_addr = addr.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    initialize_tracing();

    info!("Starting backend monitor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    cli.apply(&mut config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(MonitorError::Config(e));
    }

    let registry = Arc::new(MetricsRegistry::with_defaults());
    let prober = Arc::new(HttpProber::new()?);
    let checker = FailoverHealthChecker::new(prober, config.probe_timeout);
    let mut monitor = BackendMonitor::new(config.clone(), checker, registry.clone());

    if cli.once {
        let report = monitor.run_once().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let exporter = Arc::new(PrometheusExporter::with_namespace(
        registry,
        config.metrics_namespace.clone(),
    ));
    let server = match start_metrics_server(&config.metrics_addr, exporter) {
        Ok(server) => server,
        Err(e) => {
            error!("Metrics server failed to start: {}", e);
            return Err(e);
        }
    };
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let cancel = CancellationToken::new();
    let monitor_cancel = cancel.clone();
    let monitor_task = tokio::spawn(async move {
        monitor.run(monitor_cancel).await;
    });

    tokio::signal::ctrl_c().await?;

    info!("Shutting down backend monitor");
    cancel.cancel();
    server_handle.stop(true).await;

    if let Err(e) = monitor_task.await {
        error!("Monitor task failed: {}", e);
    }
    match server_task.await {
        Ok(Err(e)) => error!("Metrics server error: {}", e),
        Err(e) => error!("Metrics server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Backend monitor shutdown complete");
    Ok(())
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
