//! Ordered failover across health endpoints

use crate::prober::EndpointProber;
use crate::telemetry::HealthCheckResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Probes endpoints in priority order and stops at the first healthy one.
#[derive(Clone)]
pub struct FailoverHealthChecker {
    prober: Arc<dyn EndpointProber>,
    probe_timeout: Duration,
}

impl FailoverHealthChecker {
    pub fn new(prober: Arc<dyn EndpointProber>, probe_timeout: Duration) -> Self {
        Self {
            prober,
            probe_timeout,
        }
    }

    /// Return the first result whose status is `ok`, or the synthetic
    /// "all endpoints unavailable" result. Never fails.
    pub async fn check(&self, endpoints: &[String]) -> HealthCheckResult {
        for endpoint in endpoints {
            match self.prober.probe(endpoint, self.probe_timeout).await {
                Ok(result) if result.is_ok() => {
                    debug!(%endpoint, "endpoint healthy");
                    return result;
                }
                Ok(result) => {
                    warn!(%endpoint, detail = %result.detail, "endpoint reachable but unhealthy");
                }
                Err(e) => {
                    debug!(%endpoint, error = %e, "endpoint probe failed");
                }
            }
        }

        HealthCheckResult::all_unavailable()
    }
}
