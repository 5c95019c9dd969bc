//! Configuration management for the backend monitor

use crate::log_parser::LogMarkers;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// How the polling loop consumes the monitored log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    /// Continue from the last byte offset; only newly appended lines are parsed.
    Incremental,
    /// Re-read the whole file from the start on every tick.
    Rescan,
}

impl From<&str> for ReadMode {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "rescan" | "full" => ReadMode::Rescan,
            _ => ReadMode::Incremental,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Health endpoints in priority order
    pub endpoints: Vec<String>,

    /// Path to the session log file
    pub log_path: String,

    /// Period between polling ticks
    pub poll_interval: Duration,

    /// Timeout applied to every single probe
    pub probe_timeout: Duration,

    /// Listen address of the metrics server
    pub metrics_addr: String,

    /// Prefix for exported metric names
    pub metrics_namespace: String,

    pub read_mode: ReadMode,

    pub markers: LogMarkers,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "http://localhost:8000/health".to_string(),
                "http://127.0.0.1:8000/health".to_string(),
                "http://localhost:8770/health".to_string(),
                "http://localhost:8765/health".to_string(),
            ],
            log_path: "Tune.log".to_string(),
            poll_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            metrics_addr: "0.0.0.0:8080".to_string(),
            metrics_namespace: String::new(),
            read_mode: ReadMode::Incremental,
            markers: LogMarkers::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup, falling back to
    /// defaults for missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(endpoints) = lookup("MONITOR_ENDPOINTS") {
            config.endpoints = endpoints
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(log_path) = lookup("MONITOR_LOG_PATH") {
            config.log_path = log_path;
        }

        if let Some(interval) = lookup("POLL_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.poll_interval = Duration::from_secs(seconds);
            }
        }

        if let Some(timeout) = lookup("PROBE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.probe_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(addr) = lookup("METRICS_ADDR") {
            config.metrics_addr = addr;
        }

        if let Some(namespace) = lookup("METRICS_NAMESPACE") {
            config.metrics_namespace = namespace;
        }

        if let Some(mode) = lookup("LOG_READ_MODE") {
            config.read_mode = ReadMode::from(mode.as_str());
        }

        if let Some(marker) = lookup("SESSION_START_MARKER") {
            config.markers.session_start = marker;
        }

        if let Some(marker) = lookup("SESSION_END_MARKER") {
            config.markers.session_end = marker;
        }

        if let Some(marker) = lookup("UNAVAILABLE_MARKER") {
            config.markers.unavailable = marker;
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoints.is_empty() {
            return Err("at least one health endpoint must be specified".to_string());
        }

        for endpoint in &self.endpoints {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("endpoint is not an absolute HTTP URL: {}", endpoint));
            }
        }

        if self.log_path.is_empty() {
            return Err("log_path cannot be empty".to_string());
        }

        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }

        if self.probe_timeout.is_zero() {
            return Err("probe_timeout must be greater than 0".to_string());
        }

        if self.metrics_addr.is_empty() {
            return Err("metrics_addr cannot be empty".to_string());
        }

        if self.markers.session_start.is_empty()
            || self.markers.session_end.is_empty()
            || self.markers.unavailable.is_empty()
        {
            return Err("log markers cannot be empty".to_string());
        }

        Ok(())
    }
}
