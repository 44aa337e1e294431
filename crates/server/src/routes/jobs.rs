// crates/server/src/routes/jobs.rs
//! API routes for background media-generation jobs.
//!
//! - POST /jobs            — Submit a job (202, returns the pending snapshot)
//! - GET  /jobs            — List jobs for an owner, newest first
//! - GET  /jobs/stats      — Scheduler counters
//! - GET  /jobs/{id}        — Job snapshot
//! - GET  /jobs/{id}/stream — SSE stream of the job's status changes

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use sermonforge_jobs::{Job, QueueStats};

/// Header carrying the submitting actor's identity. Requests without it
/// are grouped under a shared anonymous owner.
const OWNER_HEADER: &str = "x-owner-id";
const ANONYMOUS_OWNER: &str = "anonymous";

fn owner_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_OWNER)
        .to_string()
}

/// Request body for POST /api/jobs.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub params: Value,
}

/// Query parameters for GET /api/jobs.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Overrides the owner header (dashboard views of another member's jobs).
    pub owner: Option<String>,
}

/// POST /api/jobs — accept a job and return its pending snapshot.
///
/// Always 202: an unregistered type is accepted here and fails at
/// dispatch time.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    if req.job_type.trim().is_empty() {
        return Err(ApiError::BadRequest("job type must not be empty".into()));
    }
    let owner = owner_from_headers(&headers);
    let job = state.scheduler.submit(req.job_type, req.params, owner);
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/jobs/{id} — current snapshot of one job.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .scheduler
        .get(&id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// GET /api/jobs — jobs for an owner, most recently created first.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
    headers: HeaderMap,
) -> Json<Vec<Job>> {
    let owner = query.owner.unwrap_or_else(|| owner_from_headers(&headers));
    Json(state.scheduler.list_by_owner(&owner))
}

/// GET /api/jobs/stats — point-in-time scheduler counters.
pub async fn queue_stats(State(state): State<Arc<AppState>>) -> Json<QueueStats> {
    Json(state.scheduler.stats())
}

/// GET /api/jobs/{id}/stream — SSE stream of one job's status changes.
///
/// Sends the current snapshot as the opening event, forwards every
/// subsequent transition, and closes right after the terminal event.
/// A disconnecting client just drops the subscription; the job runs on.
pub async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before snapshotting so a transition between the two
    // calls is buffered rather than lost.
    let rx = state
        .scheduler
        .subscribe(&id)
        .ok_or_else(|| ApiError::JobNotFound(id.clone()))?;
    let snapshot = state
        .scheduler
        .get(&id)
        .ok_or_else(|| ApiError::JobNotFound(id.clone()))?;
    let scheduler = Arc::clone(&state.scheduler);

    let stream = async_stream::stream! {
        let mut rx = rx;
        let opening = snapshot.to_update();
        let opening_terminal = opening.status.is_terminal();
        if let Ok(json) = serde_json::to_string(&opening) {
            yield Ok(Event::default().data(json));
        }
        if opening_terminal {
            return;
        }

        loop {
            match rx.recv().await {
                Ok(update) => {
                    let terminal = update.status.is_terminal();
                    match serde_json::to_string(&update) {
                        Ok(json) => yield Ok(Event::default().data(json)),
                        Err(e) => tracing::warn!(error = %e, "failed to encode job update"),
                    }
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Missed updates may include the terminal one; resync
                    // from the table instead of waiting forever.
                    tracing::warn!(job_id = %id, skipped, "SSE subscriber lagged, resyncing");
                    let Some(job) = scheduler.get(&id) else { break };
                    let update = job.to_update();
                    let terminal = update.status.is_terminal();
                    if let Ok(json) = serde_json::to_string(&update) {
                        yield Ok(Event::default().data(json));
                    }
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/stats", get(queue_stats))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/stream", get(stream_job))
}
