//! Embedding backends for relevance scoring.
//!
//! The scorer only needs one capability: turn a batch of texts into
//! unit-norm vectors with a single shared model. [`HttpEmbedder`] provides
//! it against any OpenAI-compatible embeddings endpoint (OpenAI itself,
//! Azure, or local servers such as vLLM and text-embeddings-inference).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EmbeddingError;

// ── Trait ───────────────────────────────────────────────────────────

/// A text embedding model.
///
/// One instance is built per run and shared (`Arc<dyn Embedder>`); it must
/// embed blocks and interests with the same model so their similarities
/// are comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts into unit-norm vectors, one per input, in
    /// input order. Internal batching must not change the result.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Vector dimensionality produced by this model.
    fn dimensions(&self) -> usize;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

// ── HTTP backend ────────────────────────────────────────────────────

/// Configuration for [`HttpEmbedder`].
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// Full endpoint URL, e.g. `https://api.openai.com/v1/embeddings`.
    pub endpoint: String,
    /// Bearer token; omitted for unauthenticated local servers.
    pub api_key: Option<SecretString>,
    /// Model name, e.g. `text-embedding-3-small`.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum texts per request; larger batches are chunked.
    pub max_batch_size: usize,
}

impl Default for HttpEmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout_secs: 30,
            max_batch_size: 100,
        }
    }
}

/// Embedder backed by an OpenAI-compatible HTTP embeddings API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: HttpEmbedderConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    /// Only OpenAI's text-embedding-3 family accepts this field.
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl HttpEmbedder {
    /// Builds the backend and its HTTP client.
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbeddingError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let bearer = format!("Bearer {}", key.expose_secret());
            let value =
                HeaderValue::from_str(&bearer).map_err(|e| EmbeddingError::InvalidConfig {
                    reason: format!("API key is not a valid header value: {e}"),
                })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self
                .config
                .model
                .contains("text-embedding-3")
                .then_some(self.config.dimensions),
            encoding_format: "float",
        };

        debug!(count = texts.len(), "requesting embeddings");
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed {
                endpoint: self.config.endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RequestFailed {
                endpoint: self.config.endpoint.clone(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse {
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        // Responses are not guaranteed to arrive in request order.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| normalize(d.embedding)).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.config.max_batch_size.max(1);
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch) {
            all.extend(self.request_embeddings(chunk).await?);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Scales a vector to unit length. Zero vectors pass through unchanged.
fn normalize(embedding: Vec<f32>) -> Vec<f32> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.into_iter().map(|x| x / norm).collect()
    } else {
        embedding
    }
}

// ── Tests ───────────────────────────────────────────────────────────
