//! HTTP surface of the Kinema ingestion pipeline.
//!
//! The binary in `main.rs` loads configuration, builds an
//! [`IngestService`](kinema_core::service::IngestService) and serves
//! [`build_router`] until interrupted.

pub mod handlers;
pub mod infra;
pub mod routes;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use infra::app_state::AppState;

/// The complete application router with tracing and CORS layers applied.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(handlers::system::ping_handler))
        .merge(routes::create_api_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
