//! HTTP endpoints of the node
//!
//! - `GET /health` - service name and version
//! - `GET /metrics` - Prometheus text exposition of the ledger collectors

use crate::metrics::Metrics;
use crate::Config;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde::Serialize;

/// State shared by the HTTP handlers
#[derive(Debug, Clone)]
pub struct NodeState {
    service_name: String,
    service_version: String,
    metrics: Metrics,
}

impl NodeState {
    /// Build from the node configuration and the ledger's collectors
    pub fn new(config: &Config, metrics: Metrics) -> Self {
        Self {
            service_name: config.service_name.clone(),
            service_version: config.service_version.clone(),
            metrics,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    version: String,
}

/// Register the node routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(prometheus_metrics));
}

/// Serve the node routes on `addr` until the process is signalled to stop
pub async fn serve(state: NodeState, addr: &str) -> std::io::Result<()> {
    let data = web::Data::new(state);

    HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .bind(addr)?
        .run()
        .await
}

async fn health_check(state: web::Data<NodeState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        service: state.service_name.clone(),
        version: state.service_version.clone(),
    })
}

async fn prometheus_metrics(state: web::Data<NodeState>) -> impl Responder {
    match state.metrics.render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}
