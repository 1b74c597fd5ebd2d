//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]**: always fails; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: calls an OpenAI-compatible `/embeddings` endpoint.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Every provider guarantees that `embed_batch` returns exactly one vector
//! per input, in input order, each of the configured dimension. Anything
//! else is reported as [`EmbeddingServiceError::Malformed`].
//!
//! # Retry Strategy
//!
//! `max_retries` defaults to `0`, so a failed call surfaces immediately.
//! When raised, transient errors are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingServiceError;
use crate::vector::Embedding;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Converts text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts; `result[i]` belongs to `texts[i]`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingServiceError>;

    /// Embed a single text, e.g. a question.
    async fn embed_one(&self, text: &str) -> Result<Embedding, EmbeddingServiceError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingServiceError::Malformed("empty embedding response".into()))
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op embedder that always returns [`EmbeddingServiceError::Disabled`].
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Embedding>, EmbeddingServiceError> {
        Err(EmbeddingServiceError::Disabled)
    }
}

// ============ Shared HTTP plumbing ============

/// Connection settings shared by the HTTP-backed providers.
struct HttpSettings {
    client: reqwest::Client,
    max_retries: u32,
    batch_size: usize,
}

impl HttpSettings {
    fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            batch_size: config.batch_size.max(1),
        })
    }

    /// POST `body` to `url`, retrying transient failures up to `max_retries` times.
    async fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, EmbeddingServiceError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(url).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| EmbeddingServiceError::Malformed(e.to_string()));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = EmbeddingServiceError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    };

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(EmbeddingServiceError::Transport(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            EmbeddingServiceError::Transport("embedding failed after retries".into())
        }))
    }
}

/// Send `texts` to `call` in slices of at most `batch_size`, checking each
/// reply's shape and concatenating the results in input order.
async fn embed_in_batches<F, Fut>(
    texts: &[String],
    batch_size: usize,
    dims: usize,
    mut call: F,
) -> Result<Vec<Embedding>, EmbeddingServiceError>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<Embedding>, EmbeddingServiceError>>,
{
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = call(batch.to_vec()).await?;
        check_shape(&vectors, batch.len(), dims)?;
        out.extend(vectors);
    }
    Ok(out)
}

/// Reject responses that would break the one-vector-per-input contract.
fn check_shape(
    vectors: &[Embedding],
    expected_len: usize,
    dims: usize,
) -> Result<(), EmbeddingServiceError> {
    if vectors.len() != expected_len {
        return Err(EmbeddingServiceError::Malformed(format!(
            "expected {} embeddings, got {}",
            expected_len,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.dims() != dims) {
        return Err(EmbeddingServiceError::Malformed(format!(
            "expected {} dimensions, got {}",
            dims,
            bad.dims()
        )));
    }
    Ok(())
}

fn parse_vector(value: &serde_json::Value) -> Result<Embedding, EmbeddingServiceError> {
    value
        .as_array()
        .ok_or_else(|| EmbeddingServiceError::Malformed("embedding is not an array".into()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingServiceError::Malformed("non-numeric component".into()))
        })
        .collect::<Result<Vec<f32>, _>>()
        .map(Embedding::new)
}

// ============ OpenAI Provider ============

/// Embedder backed by the OpenAI embeddings API (or any compatible server).
///
/// Reads its API key from the environment variable named by
/// `embedding.api_key_env` (default `OPENAI_API_KEY`). Inputs are sent in
/// batches of `embedding.batch_size`.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    http: HttpSettings,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        Ok(Self {
            model,
            dims,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: HttpSettings::new(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingServiceError> {
        let url = format!("{}/embeddings", self.base_url);
        let url = &url;

        embed_in_batches(texts, self.http.batch_size, self.dims, |batch| async move {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self.http.post_json(url, Some(&self.api_key), &body).await?;
            parse_openai_response(&json)
        })
        .await
    }
}

/// Parse `data[].embedding`, ordering entries by their `index` field.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Embedding>, EmbeddingServiceError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingServiceError::Malformed("missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| EmbeddingServiceError::Malformed("missing embedding".into()))?;
        indexed.push((index, parse_vector(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    // After sorting, the indices must be exactly 0..n.
    if let Some((position, (index, _))) = indexed
        .iter()
        .enumerate()
        .find(|(position, (index, _))| index != position)
    {
        return Err(EmbeddingServiceError::Malformed(format!(
            "unexpected embedding index {} at position {}",
            index, position
        )));
    }
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedder backed by a local Ollama instance.
///
/// Calls `POST /api/embed` on `embedding.url` (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    http: HttpSettings,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            http: HttpSettings::new(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingServiceError> {
        let url = format!("{}/api/embed", self.url);
        let url = &url;

        embed_in_batches(texts, self.http.batch_size, self.dims, |batch| async move {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self.http.post_json(url, None, &body).await?;
            parse_ollama_response(&json)
        })
        .await
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Embedding>, EmbeddingServiceError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingServiceError::Malformed("missing embeddings array".into()))?
        .iter()
        .map(parse_vector)
        .collect()
}
