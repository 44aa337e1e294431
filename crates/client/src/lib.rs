// crates/client/src/lib.rs
//! Client for the sermonforge jobs API.
//!
//! Submits a media-generation job and waits for its terminal event off
//! the per-job SSE stream: `completed` resolves with the result payload,
//! `failed` surfaces the job's error. Malformed stream events are
//! skipped; only transport-level failures abort the wait.

use futures_util::StreamExt;
use serde_json::Value;
use thiserror::Error;

use sermonforge_jobs::{Job, JobStatus, JobUpdate};

/// Errors surfaced by [`JobsClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("stream ended before a terminal event")]
    StreamClosed,
}

/// HTTP client for the jobs API.
pub struct JobsClient {
    http: reqwest::Client,
    base_url: String,
}

impl JobsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Submit a job; returns the pending snapshot (with its id).
    pub async fn submit(
        &self,
        job_type: &str,
        params: Value,
        owner: Option<&str>,
    ) -> Result<Job, ClientError> {
        let mut request = self
            .http
            .post(format!("{}/api/jobs", self.base_url))
            .json(&serde_json::json!({ "type": job_type, "params": params }));
        if let Some(owner) = owner {
            request = request.header("x-owner-id", owner);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status.as_u16(), response.text().await.ok()));
        }
        Ok(response.json::<Job>().await?)
    }

    /// Wait for a job's terminal event on its SSE stream.
    ///
    /// Resolves with the result payload on the first `completed` event
    /// and fails with the job's error on the first `failed` event.
    pub async fn wait(&self, job_id: &str) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/jobs/{}/stream", self.base_url, job_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status.as_u16(), response.text().await.ok()));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                let line = line.trim_end();
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let update: JobUpdate = match serde_json::from_str(data.trim()) {
                    Ok(update) => update,
                    Err(e) => {
                        // Skip malformed events; only transport errors abort.
                        tracing::debug!(error = %e, "skipping malformed stream event");
                        continue;
                    }
                };
                match update.status {
                    JobStatus::Completed => return Ok(update.result.unwrap_or(Value::Null)),
                    JobStatus::Failed => {
                        return Err(ClientError::JobFailed(
                            update.error.unwrap_or_else(|| "job failed".to_string()),
                        ))
                    }
                    JobStatus::Pending | JobStatus::Processing => {}
                }
            }
        }

        Err(ClientError::StreamClosed)
    }

    /// Submit a job and wait for its result.
    pub async fn submit_and_wait(
        &self,
        job_type: &str,
        params: Value,
        owner: Option<&str>,
    ) -> Result<Value, ClientError> {
        let job = self.submit(job_type, params, owner).await?;
        self.wait(&job.id).await
    }
}

fn api_error(status: u16, body: Option<String>) -> ClientError {
    let message = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .or(body)
        .unwrap_or_default();
    ClientError::Api { status, message }
}
