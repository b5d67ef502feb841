//! # Occupancy Web
//!
//! HTTP and WebSocket surface for the occupancy gate.
//!
//! ```text
//! POST /api/qr/scan ──► ScanCoordinator ──► ConnectionHub ──► /api/ws clients
//! GET  /api/qr/me        (runtime)            (hub)
//! GET  /api/occupancy
//! ```
//!
//! Handlers stay thin: extract, call the coordinator, map [`ScanError`] to
//! [`AppError`]. The [`ConnectionHub`] is both the coordinator's broadcast
//! gateway and the registry the WebSocket handler subscribes to.
//!
//! [`ScanError`]: occupancy_core::ScanError

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::AppError;
pub use extractors::{CallerIdentity, CorrelationId, IDENTITY_HEADER};
pub use hub::ConnectionHub;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete router.
///
/// Health checks sit at the root; everything else under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/qr/me", get(handlers::qr::my_credential))
        .route("/qr/scan", post(handlers::qr::scan))
        .route("/occupancy", get(handlers::occupancy::occupancy_status))
        .route("/ws", get(handlers::websocket::handle));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(correlation_id_layer())
        .with_state(state)
}
