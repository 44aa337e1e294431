// crates/jobs/src/scheduler.rs
//! Central scheduler that owns the in-memory job table.
//!
//! Dispatch is driven by two triggers: an immediate attempt on every
//! `submit` (an optimization, configurable off) and a periodic tick
//! (the correctness backstop, which also sweeps expired terminal jobs).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use ts_rs::TS;
use ulid::Ulid;

use crate::handler::HandlerRegistry;
use crate::types::{Job, JobId, JobStatus, JobUpdate};

/// Error messages longer than this are cut before they reach the job table.
const MAX_ERROR_LEN: usize = 500;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs in `processing` at once.
    pub max_concurrent: usize,
    /// Interval of the dispatch/eviction tick.
    pub tick_interval: Duration,
    /// How long terminal jobs stay in the table before eviction.
    pub retention: Duration,
    /// Attempt dispatch immediately on submit. The periodic tick alone
    /// is sufficient for correctness; this only shortens pickup latency.
    pub dispatch_on_submit: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            tick_interval: Duration::from_secs(1),
            retention: Duration::from_secs(3600),
            dispatch_on_submit: true,
        }
    }
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub active_count: usize,
    pub max_concurrent: usize,
}

struct JobEntry {
    job: Job,
    /// Submission order, used for FIFO pickup and newest-first listing.
    seq: u64,
    update_tx: broadcast::Sender<JobUpdate>,
    terminal_at: Option<Instant>,
}

/// Central job scheduler.
///
/// Thread-safe via `Arc` wrapping. All table mutations (insert,
/// transition, evict) happen under the write lock, and status events are
/// broadcast while it is held, so subscribers observe transitions for a
/// given job strictly in order.
pub struct JobScheduler {
    config: SchedulerConfig,
    registry: HandlerRegistry,
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    next_seq: AtomicU64,
    /// Number of jobs currently in `processing`. Only modified while the
    /// table write lock is held.
    active: AtomicUsize,
}

impl JobScheduler {
    pub fn new(registry: HandlerRegistry, config: SchedulerConfig) -> Self {
        Self {
            config,
            registry,
            jobs: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            active: AtomicUsize::new(0),
        }
    }

    /// Submit a new job.
    ///
    /// Inserts a `pending` job and returns its snapshot synchronously;
    /// never waits on task execution. An unregistered job type is still
    /// accepted here and fails at dispatch time, keeping submission
    /// side-effect-free and uniform.
    pub fn submit(
        self: &Arc<Self>,
        job_type: impl Into<String>,
        params: Value,
        owner_id: impl Into<String>,
    ) -> Job {
        let now = Utc::now();
        let job = Job {
            id: Ulid::new().to_string(),
            job_type: job_type.into(),
            params,
            owner_id: owner_id.into(),
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };

        let (update_tx, _) = broadcast::channel(64);
        let entry = JobEntry {
            job: job.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            update_tx,
            terminal_at: None,
        };

        match self.jobs.write() {
            Ok(mut jobs) => {
                jobs.insert(job.id.clone(), entry);
            }
            Err(e) => tracing::error!("RwLock poisoned inserting job: {e}"),
        }

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            owner_id = %job.owner_id,
            "job submitted"
        );

        if self.config.dispatch_on_submit {
            self.dispatch();
        }
        job
    }

    /// Current snapshot of a job, or `None` once evicted (or never known).
    pub fn get(&self, id: &str) -> Option<Job> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(id).map(|e| e.job.clone()),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }

    /// All non-evicted jobs for an owner, most recently created first.
    pub fn list_by_owner(&self, owner_id: &str) -> Vec<Job> {
        match self.jobs.read() {
            Ok(jobs) => {
                let mut entries: Vec<(u64, Job)> = jobs
                    .values()
                    .filter(|e| e.job.owner_id == owner_id)
                    .map(|e| (e.seq, e.job.clone()))
                    .collect();
                entries.sort_by(|a, b| b.0.cmp(&a.0));
                entries.into_iter().map(|(_, job)| job).collect()
            }
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                Vec::new()
            }
        }
    }

    /// Subscribe to status-change events for one job.
    ///
    /// Events arrive in transition order; exactly one terminal event is
    /// delivered per job. Dropping the receiver unsubscribes.
    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<JobUpdate>> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(id).map(|e| e.update_tx.subscribe()),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }

    /// Point-in-time counters across the whole table.
    pub fn stats(&self) -> QueueStats {
        let (total, pending, processing, completed, failed) = match self.jobs.read() {
            Ok(jobs) => {
                let mut counts = (jobs.len(), 0, 0, 0, 0);
                for entry in jobs.values() {
                    match entry.job.status {
                        JobStatus::Pending => counts.1 += 1,
                        JobStatus::Processing => counts.2 += 1,
                        JobStatus::Completed => counts.3 += 1,
                        JobStatus::Failed => counts.4 += 1,
                    }
                }
                counts
            }
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                (0, 0, 0, 0, 0)
            }
        };

        QueueStats {
            total,
            pending,
            processing,
            completed,
            failed,
            active_count: self.active.load(Ordering::Relaxed),
            max_concurrent: self.config.max_concurrent,
        }
    }

    /// Spawn the periodic tick: evict expired terminal jobs, then fill
    /// free concurrency slots from the pending queue.
    pub fn spawn_dispatch_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(scheduler.config.tick_interval);
            loop {
                tick.tick().await;
                scheduler.evict_expired();
                scheduler.dispatch();
            }
        })
    }

    /// Fill free slots with the oldest pending jobs (FIFO) and run their
    /// handlers. Never blocks on task execution.
    fn dispatch(self: &Arc<Self>) {
        loop {
            let Some((job, handler)) = self.claim_next() else {
                break;
            };

            let Some(handler) = handler else {
                self.finish(
                    &job.id,
                    Err(anyhow::anyhow!("unknown job type: {}", job.job_type)),
                );
                continue;
            };

            let scheduler = Arc::clone(self);
            let id = job.id.clone();
            let params = job.params;
            tokio::spawn(async move {
                // Run the handler on its own task so a panic is contained
                // as a JoinError instead of taking the dispatch task down.
                let task = tokio::spawn(async move { handler.execute(&params).await });
                let outcome = match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(anyhow::anyhow!("job handler panicked: {e}")),
                };
                scheduler.finish(&id, outcome);
                // A slot just freed up; pull the next pending job now
                // rather than waiting for the tick.
                scheduler.dispatch();
            });
        }
    }

    /// Claim the oldest pending job if a concurrency slot is free, moving
    /// it to `processing` and broadcasting the transition.
    fn claim_next(&self) -> Option<(Job, Option<Arc<dyn crate::handler::JobHandler>>)> {
        let mut jobs = match self.jobs.write() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("RwLock poisoned writing jobs map: {e}");
                return None;
            }
        };

        if self.active.load(Ordering::Relaxed) >= self.config.max_concurrent {
            return None;
        }

        let id = jobs
            .values()
            .filter(|e| e.job.status == JobStatus::Pending)
            .min_by_key(|e| e.seq)
            .map(|e| e.job.id.clone())?;

        let entry = jobs.get_mut(&id)?;
        entry.job.status = JobStatus::Processing;
        entry.job.updated_at = Utc::now();
        self.active.fetch_add(1, Ordering::Relaxed);
        let _ = entry.update_tx.send(entry.job.to_update());

        tracing::debug!(job_id = %id, job_type = %entry.job.job_type, "job dispatched");

        let handler = self.registry.get(&entry.job.job_type);
        Some((entry.job.clone(), handler))
    }

    /// Record a terminal outcome, free the concurrency slot, and
    /// broadcast the final status event.
    fn finish(&self, id: &JobId, outcome: anyhow::Result<Value>) {
        let mut jobs = match self.jobs.write() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("RwLock poisoned writing jobs map: {e}");
                return;
            }
        };

        let Some(entry) = jobs.get_mut(id) else {
            // Terminal-only eviction means a running job stays in the
            // table; still release the slot if this ever races.
            self.active.fetch_sub(1, Ordering::Relaxed);
            return;
        };
        if entry.job.status.is_terminal() {
            return;
        }

        entry.job.updated_at = Utc::now();
        match outcome {
            Ok(result) => {
                entry.job.status = JobStatus::Completed;
                entry.job.result = Some(result);
                tracing::info!(job_id = %id, job_type = %entry.job.job_type, "job completed");
            }
            Err(e) => {
                let mut message = format!("{e:#}");
                message.truncate(MAX_ERROR_LEN);
                entry.job.status = JobStatus::Failed;
                entry.job.error = Some(message.clone());
                tracing::warn!(
                    job_id = %id,
                    job_type = %entry.job.job_type,
                    error = %message,
                    "job failed"
                );
            }
        }
        entry.terminal_at = Some(Instant::now());
        self.active.fetch_sub(1, Ordering::Relaxed);
        let _ = entry.update_tx.send(entry.job.to_update());
    }

    /// Drop terminal jobs older than the retention window. Pending and
    /// processing jobs are never evicted.
    fn evict_expired(&self) {
        let retention = self.config.retention;
        let mut jobs = match self.jobs.write() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("RwLock poisoned writing jobs map: {e}");
                return;
            }
        };
        jobs.retain(|id, entry| {
            let expired = entry
                .terminal_at
                .is_some_and(|t| t.elapsed() >= retention);
            if expired {
                tracing::debug!(job_id = %id, "evicting finished job");
            }
            !expired
        });
    }
}
