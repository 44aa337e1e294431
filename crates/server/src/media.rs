// crates/server/src/media.rs
//! Task handlers that bridge jobs to the external media-generation
//! backend (image/video/audio synthesis).
//!
//! The scheduler is agnostic to what these do; each handler POSTs the
//! job params to the backend and returns its JSON body as the result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use sermonforge_jobs::{HandlerRegistry, JobHandler};

/// Job types served by the media backend.
pub const MEDIA_JOB_TYPES: [&str; 3] = ["image", "video", "audio"];

/// How much of an error body is kept in the failure message.
const MAX_BODY_SNIPPET: usize = 200;

/// Connection to the media-generation backend.
#[derive(Clone)]
pub struct MediaBackend {
    client: reqwest::Client,
    base_url: String,
}

impl MediaBackend {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building media backend HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Register a handler per media job type.
    pub fn register(&self, registry: &mut HandlerRegistry) {
        for kind in MEDIA_JOB_TYPES {
            registry.register(
                kind,
                Arc::new(MediaHandler {
                    backend: self.clone(),
                    kind,
                }),
            );
        }
    }
}

struct MediaHandler {
    backend: MediaBackend,
    kind: &'static str,
}

#[async_trait]
impl JobHandler for MediaHandler {
    async fn execute(&self, params: &Value) -> anyhow::Result<Value> {
        let url = format!("{}/generate/{}", self.backend.base_url, self.kind);
        let response = self
            .backend
            .client
            .post(&url)
            .json(params)
            .send()
            .await
            .with_context(|| format!("{} backend unreachable", self.kind))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(MAX_BODY_SNIPPET);
            anyhow::bail!("{} backend returned {status}: {body}", self.kind);
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("{} backend returned malformed JSON", self.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_media_handler_returns_backend_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate/image"))
            .and(body_json(json!({"prompt": "sunrise"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "/x.png"})))
            .mount(&server)
            .await;

        let mut registry = HandlerRegistry::new();
        MediaBackend::new(server.uri()).unwrap().register(&mut registry);

        let handler = registry.get("image").unwrap();
        let result = handler.execute(&json!({"prompt": "sunrise"})).await.unwrap();
        assert_eq!(result, json!({"url": "/x.png"}));
    }

    #[tokio::test]
    async fn test_media_handler_surfaces_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate/video"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model unavailable"))
            .mount(&server)
            .await;

        let mut registry = HandlerRegistry::new();
        MediaBackend::new(server.uri()).unwrap().register(&mut registry);

        let handler = registry.get("video").unwrap();
        let err = handler.execute(&json!({})).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"), "{msg}");
        assert!(msg.contains("model unavailable"), "{msg}");
    }

    #[tokio::test]
    async fn test_media_handler_unreachable_backend() {
        // Reserved port with nothing listening.
        let mut registry = HandlerRegistry::new();
        MediaBackend::new("http://127.0.0.1:1")
            .unwrap()
            .register(&mut registry);

        let handler = registry.get("audio").unwrap();
        let err = handler.execute(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("audio backend unreachable"));
    }

    #[test]
    fn test_registers_all_media_types() {
        let mut registry = HandlerRegistry::new();
        MediaBackend::new("http://localhost:7077/")
            .unwrap()
            .register(&mut registry);
        assert_eq!(registry.types(), vec!["audio", "image", "video"]);
    }
}
