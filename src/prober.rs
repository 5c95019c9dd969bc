//! Single-endpoint HTTP health probe

use crate::errors::{MonitorError, Result};
use crate::telemetry::{HealthCheckResult, HealthPayload};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Issues one health request against one URL.
///
/// Implementations must not retry; failover is the caller's job.
#[async_trait]
pub trait EndpointProber: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<HealthCheckResult>;
}

/// Prober backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("backend_monitor/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MonitorError::Http)?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<HealthCheckResult> {
        let response = self.client.get(url).send().await.map_err(MonitorError::Http)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(MonitorError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(MonitorError::Http)?;
        let payload: HealthPayload = serde_json::from_slice(&body)?;

        Ok(HealthCheckResult::from_payload(payload, url))
    }
}

#[async_trait]
impl EndpointProber for HttpProber {
    async fn probe(&self, url: &str, probe_timeout: Duration) -> Result<HealthCheckResult> {
        debug!(%url, "probing health endpoint");

        // Bounds connect, headers and body together.
        timeout(probe_timeout, self.fetch(url))
            .await
            .map_err(|_| MonitorError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::HealthStatus;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_decodes_healthy_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "timestamp": "2024-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let prober = HttpProber::new().unwrap();
        let url = format!("{}/health", server.uri());
        let result = prober.probe(&url, Duration::from_secs(2)).await.unwrap();

        assert_eq!(result.status, HealthStatus::Ok);
        assert_eq!(result.endpoint, Some(url));
    }

    #[tokio::test]
    async fn test_backend_without_timestamp_is_healthy() {
        let trainer = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok"
            })))
            .mount(&trainer)
            .await;

        let session = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "uptime": 12.5
            })))
            .mount(&session)
            .await;

        let prober = HttpProber::new().unwrap();
        for server in [&trainer, &session] {
            let url = format!("{}/health", server.uri());
            let result = prober.probe(&url, Duration::from_secs(2)).await.unwrap();
            assert_eq!(result.status, HealthStatus::Ok);
            assert_eq!(result.detail, "ok");
        }
    }

    #[tokio::test]
    async fn test_probe_non_200_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let prober = HttpProber::new().unwrap();
        let err = prober
            .probe(&format!("{}/health", server.uri()), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::Status(503)));
    }

    #[tokio::test]
    async fn test_probe_bad_body_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&server)
            .await;

        let prober = HttpProber::new().unwrap();
        let err = prober
            .probe(&format!("{}/health", server.uri()), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::Json(_)));
    }

    #[tokio::test]
    async fn test_probe_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "ok", "timestamp": ""}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let prober = HttpProber::new().unwrap();
        let err = prober
            .probe(&format!("{}/health", server.uri()), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::Timeout));
    }
}
