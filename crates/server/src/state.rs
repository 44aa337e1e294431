// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use sermonforge_jobs::JobScheduler;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Background job scheduler for media generation tasks.
    pub scheduler: Arc<JobScheduler>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(scheduler: Arc<JobScheduler>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            scheduler,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
