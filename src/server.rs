//! HTTP endpoint exposing collected metrics

use crate::errors::{MonitorError, Result};
use crate::exporter::PrometheusExporter;
use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
}

async fn metrics(exporter: web::Data<PrometheusExporter>) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(exporter.export())
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics))
        .route("/health", web::get().to(health_check));
}

/// Bind the metrics listener. A bind failure is returned to the caller,
/// which treats it as fatal.
pub fn start_metrics_server(addr: &str, exporter: Arc<PrometheusExporter>) -> Result<Server> {
    let data = web::Data::from(exporter);

    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
        .workers(1)
        .disable_signals()
        .bind(addr)
        .map_err(|e| MonitorError::Server(format!("failed to bind {}: {}", addr, e)))?
        .run();

    info!("Serving Prometheus metrics on {}", addr);
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsRegistry, MetricsSink, SESSION_COUNTER};
    use actix_web::test;

    #[actix_web::test]
    async fn test_metrics_endpoint() {
        let registry = Arc::new(MetricsRegistry::with_defaults());
        registry.increment_counter(SESSION_COUNTER);
        let exporter = Arc::new(PrometheusExporter::new(registry));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(exporter))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body = test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("tune_session_total 1"));
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = test::init_service(App::new().configure(routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["status"], "ok");
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let exporter = Arc::new(PrometheusExporter::new(Arc::new(MetricsRegistry::new())));
        let err = start_metrics_server("not-an-address", exporter).err().unwrap();
        assert!(matches!(err, MonitorError::Server(_)));
    }
}
