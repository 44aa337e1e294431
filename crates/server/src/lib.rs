// crates/server/src/lib.rs
//! Sermonforge server library.
//!
//! Axum-based HTTP surface over the background job scheduler: job
//! submission, snapshots, and per-job SSE progress streams.

pub mod error;
pub mod media;
pub mod routes;
pub mod state;

pub use error::*;
pub use media::MediaBackend;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, jobs, job streams)
/// - CORS for the SPA dev server (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
