//! Shared application router builder.
//!
//! Provides [`build_router`] so both the production binary (`main.rs`)
//! and the integration tests use the exact same route table and
//! middleware stack.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::handlers::{constituencies, health, totals, uploads};
use crate::state::AppState;

/// Multipart framing overhead allowed on top of the raw file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the full application [`Router`] with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/api/health", get(health::health_check))
        // Ingestion.
        .route("/api/upload", post(uploads::upload))
        .route("/api/upload/stream", post(uploads::upload_stream))
        // Upload history and rollback.
        .route("/api/uploads", get(uploads::list_uploads))
        .route("/api/uploads/stats", get(uploads::upload_stats))
        .route("/api/uploads/{id}", delete(uploads::delete_upload))
        .route(
            "/api/uploads/{id}/stream",
            delete(uploads::delete_upload_stream),
        )
        // Constituency reads.
        .route("/api/constituencies", get(constituencies::list_constituencies))
        .route(
            "/api/constituencies/summary",
            get(constituencies::constituencies_summary),
        )
        .route(
            "/api/constituencies/{id}",
            get(constituencies::get_constituency),
        )
        // National totals.
        .route("/api/totals", get(totals::get_totals))
        // -- Middleware stack (applied bottom-up) --
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
