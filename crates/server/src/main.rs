// crates/server/src/main.rs
//! Sermonforge server binary.
//!
//! Wires the handler registry and job scheduler, spawns the dispatch
//! loop, and serves the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use sermonforge_jobs::{HandlerRegistry, JobScheduler, SchedulerConfig};
use sermonforge_server::{create_app, AppState, MediaBackend};

/// Default port for the server.
const DEFAULT_PORT: u16 = 8790;

/// Default media-generation backend when MEDIA_BACKEND_URL is unset.
const DEFAULT_MEDIA_BACKEND: &str = "http://127.0.0.1:7077";

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("SERMONFORGE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn scheduler_config_from_env() -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent: env_u64("SERMONFORGE_MAX_CONCURRENT", 3) as usize,
        tick_interval: Duration::from_secs(1),
        retention: Duration::from_secs(env_u64("SERMONFORGE_RETENTION_SECS", 3600)),
        dispatch_on_submit: true,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Build the handler registry at startup; the scheduler never resolves
    // job types through global state.
    let backend_url =
        std::env::var("MEDIA_BACKEND_URL").unwrap_or_else(|_| DEFAULT_MEDIA_BACKEND.to_string());
    let mut registry = HandlerRegistry::new();
    MediaBackend::new(&backend_url)?.register(&mut registry);

    let config = scheduler_config_from_env();
    tracing::info!(
        max_concurrent = config.max_concurrent,
        retention_secs = config.retention.as_secs(),
        media_backend = %backend_url,
        job_types = ?registry.types(),
        "scheduler configured"
    );

    let scheduler = Arc::new(JobScheduler::new(registry, config));
    scheduler.spawn_dispatch_loop();

    let state = AppState::new(scheduler);
    let app = create_app(state);

    let port = get_port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    eprintln!("\n\u{1f54a} sermonforge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("  \u{2192} http://localhost:{}\n", port);

    axum::serve(listener, app).await?;

    Ok(())
}
