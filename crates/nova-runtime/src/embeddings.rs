// SPDX-License-Identifier: Apache-2.0
//! Embedding Service: an OpenAI-shaped HTTP endpoint behind a trait, so the
//! rest of the system treats "no embeddings provider configured" as a normal
//! degraded mode (§9 "Embeddings optional everywhere") rather than an error.

use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// `None` when no provider is configured — callers fall back to
    /// lexical-only search rather than treating this as a failure.
    async fn embed(&self, text: &str) -> anyhow::Result<Option<Vec<f32>>>;
    fn dimensions(&self) -> usize;
    fn provider_name(&self) -> &str;
    fn model_name(&self) -> &str;
}

/// No provider configured at all.
pub struct DisabledEmbeddingService {
    dimensions: usize,
}

impl DisabledEmbeddingService {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingService for DisabledEmbeddingService {
    async fn embed(&self, _text: &str) -> anyhow::Result<Option<Vec<f32>>> {
        Ok(None)
    }
    fn dimensions(&self) -> usize {
        self.dimensions
    }
    fn provider_name(&self) -> &str {
        "disabled"
    }
    fn model_name(&self) -> &str {
        ""
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// A custom OpenAI-compatible `/embeddings` HTTP endpoint.
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

impl HttpEmbeddingService {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, text: &str) -> anyhow::Result<Option<Vec<f32>>> {
        let mut req = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .json(&serde_json::json!({ "model": self.model, "input": text }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?.error_for_status()?;
        let parsed: EmbeddingsResponse = resp.json().await?;
        Ok(parsed.data.into_iter().next().map(|d| d.embedding))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
    fn provider_name(&self) -> &str {
        "custom_http"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_service_always_returns_none() {
        let svc = DisabledEmbeddingService::new(1536);
        assert_eq!(svc.embed("hello").await.unwrap(), None);
        assert_eq!(svc.dimensions(), 1536);
    }
}
