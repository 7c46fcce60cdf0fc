//! HTTP router construction.
//!
//! Assembles the Axum routes, middleware, and OpenAPI docs into a single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .route("/search", get(api::search))
        .route("/health", get(api::health))
        .route("/openapi.json", get(api::doc::openapi_json))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}

/// `*` allows any origin; anything else is a single allowed origin.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin.trim() == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin.trim()) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(e) => {
            warn!(origin, error = %e, "Invalid CORS_ORIGIN, cross-origin requests disabled");
            CorsLayer::new()
        }
    }
}
