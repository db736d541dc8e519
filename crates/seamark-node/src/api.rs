//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `config` - Configuration record read/write (the provisioning surface)
//! - `health` - Service health checks
//! - `status` - Node status, connectivity, last published event
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation
//!
//! The same router serves both modes. In provisioning it is the entire
//! purpose of the process; in operational mode it is a read-mostly
//! side-channel that never touches supervisor state.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod config;
pub mod error;
pub mod health;
pub mod openapi;
pub mod status;

// Re-export commonly used types
#[allow(unused_imports)]
pub use error::{ApiError, ApiResult, ErrorResponse};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /status                - Node status snapshot
/// /api
/// ├── /config            - Configuration read/write
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/status", status::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/config", config::router()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
