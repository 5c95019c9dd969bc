//! Health and metric event data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body returned by a backend's `GET /health` route.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthPayload {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Several backends answer with just `{"status": "ok"}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Error,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

impl From<&str> for HealthStatus {
    fn from(s: &str) -> Self {
        // Only the exact wire value counts as healthy.
        if s == "ok" {
            HealthStatus::Ok
        } else {
            HealthStatus::Error
        }
    }
}

/// Outcome of one health check.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    /// Endpoint that produced the result; `None` for the aggregate failure.
    pub endpoint: Option<String>,
}

pub const ALL_ENDPOINTS_UNAVAILABLE: &str = "all endpoints unavailable";

impl HealthCheckResult {
    /// Build a result from a decoded payload.
    pub fn from_payload(payload: HealthPayload, endpoint: &str) -> Self {
        let status = HealthStatus::from(payload.status.as_str());
        let detail = match status {
            HealthStatus::Ok => payload.status.clone(),
            HealthStatus::Error => payload
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| payload.status.clone()),
        };

        let timestamp = payload
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Self {
            status,
            detail,
            timestamp,
            endpoint: Some(endpoint.to_string()),
        }
    }

    pub fn all_unavailable() -> Self {
        Self {
            status: HealthStatus::Error,
            detail: ALL_ENDPOINTS_UNAVAILABLE.to_string(),
            timestamp: Utc::now(),
            endpoint: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

/// Event derived from the session log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MetricEvent {
    SessionStarted,
    SessionEnded { duration_secs: f64 },
    AvailabilitySample { value: f64 },
}
