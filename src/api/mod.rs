use actix_web::{dev::Server, web, App, HttpServer};
use std::sync::Arc;

use crate::config::Config;
use crate::metrics::{health_handler, metrics_handler, Metrics};
use crate::pipeline::ReadPath;

// ============================================================================
// HTTP API
// ============================================================================
//
// GET /order/{order_uid}  order JSON, 404 if unknown, 503 if the store fails
// GET /health             liveness plus cache occupancy
// GET /metrics            Prometheus exposition
// GET /                   lookup page
//
// ============================================================================

mod errors;
mod orders;

pub use errors::ApiError;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/order/{order_uid}", web::get().to(orders::get_order))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/", web::get().to(orders::index));
}

/// Bind the HTTP server. OS signals are left to the caller.
pub fn serve(config: &Config, reads: ReadPath, metrics: Arc<Metrics>) -> std::io::Result<Server> {
    let cache = reads.cache().clone();

    tracing::info!(
        host = %config.http_host,
        port = config.http_port,
        "🌐 Starting HTTP server"
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(reads.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .app_data(web::Data::new(cache.clone()))
            .configure(routes)
    })
    .bind(config.http_addr())?
    .disable_signals()
    .shutdown_timeout(config.shutdown_timeout.as_secs())
    .run();

    Ok(server)
}
