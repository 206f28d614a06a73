//! HTTP API application wiring (Axum router + engine wiring).
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and query parsing
//! - `errors.rs`: consistent error responses

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use jobrelay_infra::jobs::JobEngine;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// CORS is fully permissive: the browser client is served from another origin.
pub fn build_app(engine: JobEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/stats", get(routes::system::stats))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(cors)
                .layer(Extension(engine)),
        )
}
