//! API route handlers for the sermonforge server.

pub mod health;
pub mod jobs;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health           - Health check
/// - POST /api/jobs             - Submit a media-generation job
/// - GET  /api/jobs             - List jobs for an owner
/// - GET  /api/jobs/stats       - Scheduler counters
/// - GET  /api/jobs/:id         - Job snapshot
/// - GET  /api/jobs/:id/stream  - SSE stream of job status changes
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sermonforge_jobs::{HandlerRegistry, JobScheduler, SchedulerConfig};

    #[tokio::test]
    async fn test_api_routes_creation() {
        let scheduler = Arc::new(JobScheduler::new(
            HandlerRegistry::new(),
            SchedulerConfig::default(),
        ));
        let _router = api_routes(AppState::new(scheduler));
    }
}
