// crates/jobs/src/types.rs
//! Types for the background job system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Unique identifier for a job (ULID, generated at submission).
pub type JobId = String;

/// Status of a background job.
///
/// Transitions are monotonic: `Pending → Processing → {Completed | Failed}`.
/// A job never re-enters `Pending` and never leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/types/generated/")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of a single job as seen by API consumers.
///
/// Exactly one of `result`/`error` is populated, and only once the
/// status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub params: Value,
    pub owner_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build the status-change event for the job's current state.
    pub fn to_update(&self) -> JobUpdate {
        JobUpdate {
            job_id: self.id.clone(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            timestamp: self.updated_at.to_rfc3339(),
        }
    }
}

/// Status-change event sent via SSE.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_job() -> Job {
        Job {
            id: "01JX3E9GN3T5CJ8WPRMA1B2C3D".to_string(),
            job_type: "image".to_string(),
            params: json!({"prompt": "sunrise"}),
            owner_id: "user-1".to_string(),
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let json = serde_json::to_string(&sample_job()).unwrap();
        assert!(json.contains("\"type\":\"image\""));
        assert!(json.contains("\"ownerId\":\"user-1\""));
        assert!(json.contains("\"status\":\"pending\""));
        // Unset result/error are omitted entirely.
        assert!(!json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_job_update_round_trip() {
        let mut job = sample_job();
        job.status = JobStatus::Completed;
        job.result = Some(json!({"url": "/x.png"}));

        let update = job.to_update();
        let json = serde_json::to_string(&update).unwrap();
        let parsed: JobUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, JobStatus::Completed);
        assert_eq!(parsed.result, Some(json!({"url": "/x.png"})));
        assert_eq!(parsed.error, None);
    }
}
