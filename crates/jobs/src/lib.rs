// crates/jobs/src/lib.rs
//! Background job scheduling for long-running media generation.
//!
//! Provides:
//! - `JobScheduler` — in-memory job table with bounded-concurrency dispatch
//! - `HandlerRegistry` / `JobHandler` — pluggable per-type task executors
//! - `Job` / `JobUpdate` — SSE-compatible snapshots and status events

pub mod handler;
pub mod scheduler;
pub mod types;

pub use handler::{handler_fn, HandlerRegistry, JobHandler};
pub use scheduler::{JobScheduler, QueueStats, SchedulerConfig};
pub use types::{Job, JobId, JobStatus, JobUpdate};
