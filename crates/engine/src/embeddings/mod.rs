mod openai;

use askpage_common::config::{Config, RetryConfig};

/// Max texts per embedding API call.
const BATCH_SIZE: usize = 64;

/// Client for computing text embeddings via an OpenAI-compatible API.
///
/// The model and dimension are fixed per deployment so every stored vector
/// is comparable.
pub struct EmbeddingClient {
    http: reqwest::Client,
    model: String,
    dimensions: u32,
    retry: RetryConfig,
    api_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding API HTTP error: {0}")]
    Http(String),

    #[error("Embedding API auth error: {0}")]
    Auth(String),

    #[error("Embedding API rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: u32, got: usize },

    #[error("Embedding API error: {0}")]
    Api(String),
}

impl EmbeddingError {
    fn is_non_retryable(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::DimensionMismatch { .. })
    }
}

impl From<EmbeddingError> for askpage_common::AskpageError {
    fn from(e: EmbeddingError) -> Self {
        askpage_common::AskpageError::Embedding(e.to_string())
    }
}

impl EmbeddingClient {
    /// Create a new embedding client from deployment config. The API key is
    /// read from `OPENAI_API_KEY`; a missing key surfaces as an auth error
    /// at call time.
    pub fn new(config: &Config) -> Self {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Some(key),
            _ => {
                tracing::warn!(
                    "OPENAI_API_KEY not set — embedding calls will fail and jobs \
                     depending on them will be retried then dead-lettered"
                );
                None
            }
        };

        Self {
            http: reqwest::Client::new(),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
            retry: config.retry.clone(),
            api_key,
        }
    }

    /// The fixed embedding dimension for this deployment.
    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    /// Embed a single text.
    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Api("Empty response from embedding API".into()))
    }

    /// Embed a batch of texts, splitting into API-sized sub-batches.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.call_api(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    /// Call the embedding API with retry logic.
    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EmbeddingError::Auth("OPENAI_API_KEY is not set".into()))?;

        let mut attempt = 0u32;
        let mut backoff_ms = self.retry.initial_backoff_ms;

        loop {
            attempt += 1;
            match openai::call_openai_embeddings(
                &self.http,
                api_key,
                &self.model,
                self.dimensions,
                texts,
            )
            .await
            {
                Ok(embeddings) => return Ok(embeddings),
                Err(ref e) if e.is_non_retryable() => {
                    metrics::counter!("embedding.api.errors").increment(1);
                    return Err(EmbeddingError::Api(format!(
                        "Non-retryable embedding error on attempt {}: {}",
                        attempt, e
                    )));
                }
                Err(EmbeddingError::RateLimited { retry_after }) => {
                    if attempt >= self.retry.max_attempts {
                        metrics::counter!("embedding.api.errors").increment(1);
                        return Err(EmbeddingError::RateLimited { retry_after });
                    }
                    let wait = retry_after.map(|s| s * 1000).unwrap_or(backoff_ms);
                    tracing::warn!(attempt, wait_ms = wait, "Embedding API rate limited, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        metrics::counter!("embedding.api.errors").increment(1);
                        return Err(e);
                    }
                    tracing::warn!(attempt, wait_ms = backoff_ms, error = %e, "Embedding API error, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms as f64 * self.retry.backoff_multiplier) as u64;
                    backoff_ms = backoff_ms.min(self.retry.max_backoff_ms);
                }
            }
        }
    }
}
