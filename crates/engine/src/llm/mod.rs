//! LLM generation layer.
//!
//! The pipeline sees three capabilities — text generation, JSON generation,
//! and (via [`crate::embeddings`]) embedding generation — behind a client
//! that dispatches to a provider backend by model-id prefix and retries
//! transient failures with exponential backoff.

mod anthropic;
mod gemini;
mod openai;
pub mod prompts;

use serde_json::Value;

use askpage_common::config::RetryConfig;

/// Provider family, selected by model-id prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAiLike,
    AnthropicLike,
    GeminiLike,
}

impl Provider {
    /// Dispatch by model-id prefix. Unknown prefixes are an error, not a
    /// silent fallback.
    pub fn for_model(model: &str) -> Option<Self> {
        if model.starts_with("claude") {
            Some(Self::AnthropicLike)
        } else if model.starts_with("gemini") {
            Some(Self::GeminiLike)
        } else if ["gpt-", "chatgpt-", "o1", "o3", "o4"]
            .iter()
            .any(|p| model.starts_with(p))
        {
            Some(Self::OpenAiLike)
        } else {
            None
        }
    }

    /// Whether the backend can ground responses in web search. Publisher
    /// `use_grounding` is honored only when this is true.
    pub fn supports_grounding(&self) -> bool {
        matches!(self, Self::GeminiLike)
    }

    pub fn key_env(&self) -> &'static str {
        match self {
            Self::OpenAiLike => "OPENAI_API_KEY",
            Self::AnthropicLike => "ANTHROPIC_API_KEY",
            Self::GeminiLike => "GEMINI_API_KEY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAiLike => "openai",
            Self::AnthropicLike => "anthropic",
            Self::GeminiLike => "gemini",
        }
    }
}

/// A single generation request.
#[derive(Debug, Clone)]
pub struct TextRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Request web-search grounding. Silently ignored by providers that do
    /// not advertise it.
    pub grounding: bool,
}

/// Errors from LLM API calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM HTTP error: {0}")]
    Http(String),

    #[error("LLM auth error: {0}")]
    Auth(String),

    #[error("LLM rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM response parse error: {0}")]
    Parse(String),

    #[error("No provider for model: {0}")]
    UnknownModel(String),
}

impl LlmError {
    /// Whether this error should not be retried.
    fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Auth(_) | LlmError::UnknownModel(_) | LlmError::Parse(_)
        )
    }
}

impl From<LlmError> for askpage_common::AskpageError {
    fn from(e: LlmError) -> Self {
        askpage_common::AskpageError::LlmApi(e.to_string())
    }
}

/// LLM API client with provider dispatch and retry logic. API keys are read
/// from the environment once at construction; a missing key surfaces as an
/// auth error when the corresponding provider is first dispatched.
pub struct LlmClient {
    http: reqwest::Client,
    retry: RetryConfig,
    openai_key: Option<String>,
    anthropic_key: Option<String>,
    gemini_key: Option<String>,
}

impl LlmClient {
    pub fn from_env(retry: RetryConfig) -> Self {
        let read = |name: &str| match std::env::var(name) {
            Ok(key) if !key.is_empty() => Some(key),
            _ => None,
        };

        let client = Self {
            http: reqwest::Client::new(),
            retry,
            openai_key: read("OPENAI_API_KEY"),
            anthropic_key: read("ANTHROPIC_API_KEY"),
            gemini_key: read("GEMINI_API_KEY"),
        };

        for provider in [
            Provider::OpenAiLike,
            Provider::AnthropicLike,
            Provider::GeminiLike,
        ] {
            if client.key_for(provider).is_err() {
                tracing::warn!(
                    env_var = provider.key_env(),
                    provider = provider.label(),
                    "API key not set — models of this provider will fail"
                );
            }
        }

        client
    }

    fn key_for(&self, provider: Provider) -> Result<&str, LlmError> {
        let key = match provider {
            Provider::OpenAiLike => &self.openai_key,
            Provider::AnthropicLike => &self.anthropic_key,
            Provider::GeminiLike => &self.gemini_key,
        };
        key.as_deref()
            .ok_or_else(|| LlmError::Auth(format!("{} is not set", provider.key_env())))
    }

    /// Generate text with retry on transient failures.
    pub async fn generate_text(&self, req: &TextRequest<'_>) -> Result<String, LlmError> {
        let provider = Provider::for_model(req.model)
            .ok_or_else(|| LlmError::UnknownModel(req.model.to_string()))?;

        let mut attempt = 0u32;
        let mut backoff_ms = self.retry.initial_backoff_ms;

        loop {
            attempt += 1;
            let result = self.send_once(provider, req).await;

            match result {
                Ok(text) => return Ok(text),
                Err(ref e) if e.is_non_retryable() => {
                    metrics::counter!("llm.api.errors", "provider" => provider.label())
                        .increment(1);
                    return result;
                }
                Err(LlmError::RateLimited { retry_after }) => {
                    if attempt >= self.retry.max_attempts {
                        metrics::counter!("llm.api.errors", "provider" => provider.label())
                            .increment(1);
                        return Err(LlmError::RateLimited { retry_after });
                    }
                    let wait = retry_after.map(|s| s * 1000).unwrap_or(backoff_ms);
                    tracing::warn!(attempt, wait_ms = wait, "LLM rate limited, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        metrics::counter!("llm.api.errors", "provider" => provider.label())
                            .increment(1);
                        return Err(e);
                    }
                    let jitter = if self.retry.jitter {
                        compute_jitter(attempt, backoff_ms)
                    } else {
                        0
                    };
                    let wait = backoff_ms + jitter;
                    tracing::warn!(attempt, wait_ms = wait, error = %e, "LLM API error, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
                    backoff_ms = (backoff_ms as f64 * self.retry.backoff_multiplier) as u64;
                    backoff_ms = backoff_ms.min(self.retry.max_backoff_ms);
                }
            }
        }
    }

    /// Generate JSON output. The raw response is parsed strictly; on parse
    /// failure a single repair attempt (outermost-brace extraction) is made
    /// before giving up.
    pub async fn generate_json(&self, req: &TextRequest<'_>) -> Result<Value, LlmError> {
        let raw = self.generate_text(req).await?;
        parse_or_repair_json(&raw)
    }

    /// Single attempt — routes to the provider-specific implementation.
    async fn send_once(
        &self,
        provider: Provider,
        req: &TextRequest<'_>,
    ) -> Result<String, LlmError> {
        let api_key = self.key_for(provider)?;
        let grounding = req.grounding && provider.supports_grounding();

        match provider {
            Provider::OpenAiLike => openai::send_chat_completion(&self.http, api_key, req).await,
            Provider::AnthropicLike => anthropic::send_messages(&self.http, api_key, req).await,
            Provider::GeminiLike => {
                gemini::send_generate_content(&self.http, api_key, req, grounding).await
            }
        }
    }
}

/// Parse LLM output as JSON; on failure, trim to the outermost `{…}` block
/// and try once more.
pub fn parse_or_repair_json(raw: &str) -> Result<Value, LlmError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(LlmError::Parse(format!(
        "response is not valid JSON after repair: {}",
        truncate_for_log(trimmed)
    )))
}

fn truncate_for_log(s: &str) -> String {
    const MAX: usize = 200;
    if s.len() <= MAX {
        s.to_string()
    } else {
        let mut end = MAX;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// Compute jitter for retry backoff using a simple hash-based approach.
fn compute_jitter(attempt: u32, backoff_ms: u64) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    attempt.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .hash(&mut hasher);
    hasher.finish() % (backoff_ms / 2 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_dispatch() {
        assert_eq!(Provider::for_model("gpt-4o-mini"), Some(Provider::OpenAiLike));
        assert_eq!(Provider::for_model("o3-mini"), Some(Provider::OpenAiLike));
        assert_eq!(
            Provider::for_model("claude-sonnet-4-20250514"),
            Some(Provider::AnthropicLike)
        );
        assert_eq!(
            Provider::for_model("gemini-2.0-flash"),
            Some(Provider::GeminiLike)
        );
        assert_eq!(Provider::for_model("llama-3-70b"), None);
    }

    #[test]
    fn test_grounding_support() {
        assert!(Provider::GeminiLike.supports_grounding());
        assert!(!Provider::OpenAiLike.supports_grounding());
        assert!(!Provider::AnthropicLike.supports_grounding());
    }

    #[test]
    fn test_parse_clean_json() {
        let value = parse_or_repair_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_repair_fenced_json() {
        let raw = "Here is the result:\n```json\n{\"questions\": []}\n```\nDone.";
        let value = parse_or_repair_json(raw).unwrap();
        assert!(value["questions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_repair_failure_is_error() {
        assert!(parse_or_repair_json("no json here at all").is_err());
        assert!(parse_or_repair_json("{broken: json").is_err());
    }
}
