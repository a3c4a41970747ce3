//! Ollama embedding provider over the local HTTP API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingsConfig;
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    /// Model used for embeddings
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::Connection(format!(
                "Ollama embedding failed: HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(Error::internal(format!(
                "Ollama embedding rejected: HTTP {}",
                status
            )));
        }

        let body: EmbedResponse = response.json().await?;
        if body.embedding.len() != self.dimensions {
            return Err(Error::internal(format!(
                "Ollama returned {} dimensions for {}, expected {}",
                body.embedding.len(),
                self.model,
                self.dimensions
            )));
        }

        tracing::debug!("Embedded {} chars with {}", text.len(), self.model);
        Ok(body.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_base_url() {
        let config = EmbeddingsConfig {
            base_url: "http://localhost:11434/".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434");
        assert_eq!(embedder.dimensions(), config.dimensions);
        assert_eq!(embedder.name(), "ollama");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let config = EmbeddingsConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();

        assert!(!embedder.health_check().await.unwrap());
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
