//! Embedding provider abstraction.
//!
//! The ranker and corpus depend on [`EmbeddingProvider`] abstractly; concrete
//! providers are injected at construction. When the provider is disabled the
//! semantic scoring channel simply contributes nothing.
//!
//! The OpenAI provider retries transient failures with exponential backoff:
//! HTTP 429 and 5xx retry, other 4xx fail immediately, network errors retry.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EngineError;

/// Capability interface for computing text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Whether this provider can actually produce embeddings.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;
}

/// Instantiate the provider named by the configuration.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<std::sync::Arc<dyn EmbeddingProvider>, EngineError> {
    match config.provider.as_str() {
        "disabled" => Ok(std::sync::Arc::new(DisabledProvider)),
        "openai" => Ok(std::sync::Arc::new(OpenAiProvider::new(config)?)),
        other => Err(EngineError::InvalidArgument(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Cosine similarity between two vectors; `0.0` for mismatched lengths or
/// zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ============ Disabled provider ============

/// No-op provider used when embeddings are not configured.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn is_enabled(&self) -> bool {
        false
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Err(EngineError::BackendUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI provider ============

/// Embedding provider backed by `POST /v1/embeddings`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    max_retries: u32,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EngineError> {
        let model = config.model.clone().ok_or_else(|| {
            EngineError::InvalidArgument("embedding.model required for openai provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            EngineError::InvalidArgument("embedding.dims required for openai provider".to_string())
        })?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(EngineError::BackendUnavailable(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EngineError::BackendUnavailable("OPENAI_API_KEY not set".to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut attempt = 0u32;
        loop {
            let result = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: OpenAiEmbeddingResponse = resp
                            .json()
                            .await
                            .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;
                        let vectors: Vec<Vec<f32>> =
                            parsed.data.into_iter().map(|d| d.embedding).collect();
                        if vectors.len() != texts.len() {
                            return Err(EngineError::BackendUnavailable(format!(
                                "expected {} embeddings, got {}",
                                texts.len(),
                                vectors.len()
                            )));
                        }
                        return Ok(vectors);
                    } else if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(status = %status, attempt, "retryable embedding error");
                    } else {
                        return Err(EngineError::BackendUnavailable(format!(
                            "embeddings API returned {}",
                            status
                        )));
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "embedding request failed");
                }
            }

            if attempt >= self.max_retries {
                return Err(EngineError::BackendUnavailable(format!(
                    "embeddings API failed after {} attempts",
                    attempt + 1
                )));
            }

            let backoff = Duration::from_secs(1 << attempt.min(5));
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, -0.2, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_mismatched_and_zero_vectors() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn disabled_provider_refuses_to_embed() {
        let provider = DisabledProvider;
        assert!(!provider.is_enabled());
        let err = provider.embed(&["text".to_string()]).await.unwrap_err();
        assert!(matches!(err, EngineError::BackendUnavailable(_)));
    }

    #[test]
    fn create_provider_rejects_unknown_names() {
        let config = EmbeddingConfig {
            provider: "quantum".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
