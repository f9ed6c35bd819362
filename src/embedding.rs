//! Embedding provider abstraction and HTTP implementations.
//!
//! - **[`OpenAiEmbedder`]**: `POST https://api.openai.com/v1/embeddings`,
//!   authenticated with `OPENAI_API_KEY`.
//! - **[`HuggingFaceEmbedder`]**: Hugging Face Inference API
//!   feature-extraction pipeline, authenticated with `HF_TOKEN` when set.
//!
//! Use [`create_embedder`] to build the provider named in `[embedding]`;
//! it returns `None` when embeddings are disabled, in which case indexes are
//! built with chunks only.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
//! - Other 4xx → fail immediately
//! - Network errors → retry

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, EmbeddingProvider};

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const HUGGINGFACE_URL: &str = "https://api-inference.huggingface.co/pipeline/feature-extraction";

/// A backend that turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch, returning one vector per input in the same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the configured embedder, or `None` when the provider is disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match config.provider {
        EmbeddingProvider::Disabled => Ok(None),
        EmbeddingProvider::OpenAi => Ok(Some(Arc::new(OpenAiEmbedder::new(config)?))),
        EmbeddingProvider::HuggingFace => Ok(Some(Arc::new(HuggingFaceEmbedder::new(config)?))),
    }
}

fn build_http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}

fn required_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", config.provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow!("embedding.dims required for {} provider", config.provider))?;
    Ok((model, dims))
}

/// POST `body` to `url`, retrying transient failures.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider = label, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        if let Some(token) = bearer {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

fn as_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|arr| arr.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// # Errors
    ///
    /// Fails if `model`/`dims` are unset or `OPENAI_API_KEY` is missing.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model(config)?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: build_http_client(config)?,
            url: OPENAI_URL.to_string(),
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }

    /// Point the embedder at a different endpoint (proxies, tests).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
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

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let vector = item
            .get("embedding")
            .and_then(as_vector)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Hugging Face ============

pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HuggingFaceEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model(config)?;
        let token = std::env::var("HF_TOKEN").ok().filter(|t| !t.trim().is_empty());

        Ok(Self {
            client: build_http_client(config)?,
            url: format!("{}/{}", HUGGINGFACE_URL, model),
            token,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });
        let json = post_with_retry(
            &self.client,
            &self.url,
            self.token.as_deref(),
            &body,
            self.max_retries,
            "HuggingFace",
        )
        .await?;
        parse_feature_extraction(&json, texts.len())
    }
}

/// The feature-extraction pipeline returns `[[f32; dims]; n]`.
fn parse_feature_extraction(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let rows = json
        .as_array()
        .ok_or_else(|| anyhow!("Invalid HuggingFace response: expected an array"))?;

    let vectors = rows
        .iter()
        .map(|row| as_vector(row).ok_or_else(|| anyhow!("Invalid HuggingFace response: row is not an array")))
        .collect::<Result<Vec<_>>>()?;

    if vectors.len() != expected {
        bail!(
            "HuggingFace returned {} embeddings for {} inputs",
            vectors.len(),
            expected
        );
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_creates_nothing() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert!(embedder.is_none());
    }

    #[test]
    fn test_openai_response_sorted_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_openai_response_missing_data() {
        assert!(parse_openai_response(&serde_json::json!({ "error": "x" })).is_err());
    }

    #[test]
    fn test_feature_extraction_count_mismatch() {
        let json = serde_json::json!([[0.1, 0.2]]);
        assert!(parse_feature_extraction(&json, 2).is_err());
        assert_eq!(parse_feature_extraction(&json, 1).unwrap().len(), 1);
    }

    fn openai_embedder(url: String, max_retries: u32) -> OpenAiEmbedder {
        OpenAiEmbedder {
            client: reqwest::Client::new(),
            url,
            api_key: "sk-test".to_string(),
            model: "text-embedding-3-small".to_string(),
            dims: 2,
            max_retries,
        }
    }

    #[test]
    fn test_openai_requires_model_before_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::OpenAi,
            dims: Some(2),
            ..EmbeddingConfig::default()
        };
        let err = OpenAiEmbedder::new(&config).err().unwrap();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[tokio::test]
    async fn test_openai_retries_rate_limit_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", "/v1/embeddings")
            .with_status(429)
            .with_body("slow down")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["alpha", "beta"],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let embedder = openai_embedder(format!("{}/v1/embeddings", server.url()), 2);
        let vectors = embedder
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();

        limited.assert_async().await;
        ok.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }

    #[tokio::test]
    async fn test_openai_client_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(400)
            .with_body("invalid input")
            .expect(1)
            .create_async()
            .await;

        let embedder = openai_embedder(format!("{}/v1/embeddings", server.url()), 3);
        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("OpenAI API error 400"));
    }

    #[tokio::test]
    async fn test_huggingface_client_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embed")
            .with_status(400)
            .with_body("bad input")
            .expect(1)
            .create_async()
            .await;

        let config = EmbeddingConfig {
            provider: EmbeddingProvider::HuggingFace,
            model: Some("BAAI/bge-small-en-v1.5".to_string()),
            dims: Some(384),
            max_retries: 3,
            ..EmbeddingConfig::default()
        };
        let embedder = HuggingFaceEmbedder::new(&config)
            .unwrap()
            .with_url(format!("{}/embed", server.url()));

        let err = embedder.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("400"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_huggingface_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embed")
            .with_status(200)
            .with_body("[[0.5, 0.5, 0.0], [0.0, 0.0, 1.0]]")
            .create_async()
            .await;

        let config = EmbeddingConfig {
            provider: EmbeddingProvider::HuggingFace,
            model: Some("m".to_string()),
            dims: Some(3),
            ..EmbeddingConfig::default()
        };
        let embedder = HuggingFaceEmbedder::new(&config)
            .unwrap()
            .with_url(format!("{}/embed", server.url()));

        let vectors = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.0, 0.0, 1.0]);
        assert_eq!(embedder.dims(), 3);
    }
}
