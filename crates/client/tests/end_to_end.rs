//! Full-stack test: real server over TCP, real client over SSE.

use std::sync::Arc;

use serde_json::json;

use sermonforge_client::{ClientError, JobsClient};
use sermonforge_jobs::{handler_fn, HandlerRegistry, JobScheduler, SchedulerConfig};
use sermonforge_server::{create_app, AppState};

async fn start_server() -> String {
    let registry = HandlerRegistry::new()
        .with(
            "image",
            handler_fn(|_| async { Ok(json!({"url": "/x.png"})) }),
        )
        .with(
            "video",
            handler_fn(|_| async { anyhow::bail!("model unavailable") }),
        );
    let scheduler = Arc::new(JobScheduler::new(registry, SchedulerConfig::default()));
    scheduler.spawn_dispatch_loop();
    let app = create_app(AppState::new(scheduler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_submit_and_wait_resolves_with_result() {
    let base_url = start_server().await;
    let client = JobsClient::new(base_url);

    let result = client
        .submit_and_wait("image", json!({"prompt": "sunrise"}), Some("pastor-1"))
        .await
        .unwrap();
    assert_eq!(result, json!({"url": "/x.png"}));
}

#[tokio::test]
async fn test_submit_and_wait_rejects_with_job_error() {
    let base_url = start_server().await;
    let client = JobsClient::new(base_url);

    let err = client
        .submit_and_wait("video", json!({}), None)
        .await
        .unwrap_err();
    match err {
        ClientError::JobFailed(message) => assert_eq!(message, "model unavailable"),
        other => panic!("expected JobFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_abandoning_the_stream_leaves_the_job_running() {
    let base_url = start_server().await;
    let client = JobsClient::new(base_url.clone());

    let job = client
        .submit("image", json!({"prompt": "dove"}), None)
        .await
        .unwrap();

    // One watcher gives up immediately; a second still sees the result.
    drop(client);
    let second = JobsClient::new(base_url);
    let result = second.wait(&job.id).await.unwrap();
    assert_eq!(result, json!({"url": "/x.png"}));
}
