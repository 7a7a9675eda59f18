use serde::{Deserialize, Serialize};

use crate::error::AskpageError;

/// Engine configuration, assembled from environment variables at startup.
/// Every knob has a default; only `DATABASE_URL` and `ADMIN_API_KEY` are
/// required in production.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub admin_api_key: String,
    pub engine_port: u16,
    /// Worker queue poll interval. Idle workers sleep the full interval.
    pub poll_interval_seconds: u64,
    /// A processing job whose heartbeat is older than this is reclaimed.
    pub stale_lease_seconds: u64,
    /// Number of worker tasks. 0 disables the pool (API-only process).
    pub worker_pool_size: u32,
    pub crawler_timeout_seconds: u64,
    pub crawler_max_content_bytes: usize,
    pub embedding_model: String,
    pub embedding_dimensions: u32,
    pub qa_rate_limit_per_minute: u32,
    pub retry: RetryConfig,
}

impl Config {
    /// Read configuration from the environment. Missing required variables
    /// or unparseable values are reported, not defaulted.
    pub fn from_env() -> Result<Self, AskpageError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            admin_api_key: required("ADMIN_API_KEY")?,
            engine_port: parsed("ENGINE_PORT", 8080)?,
            poll_interval_seconds: parsed("POLL_INTERVAL_SECONDS", 5)?,
            stale_lease_seconds: parsed("STALE_LEASE_SECONDS", 600)?,
            worker_pool_size: parsed("WORKER_POOL_SIZE", 2)?,
            crawler_timeout_seconds: parsed("CRAWLER_TIMEOUT_SECONDS", 30)?,
            crawler_max_content_bytes: parsed("CRAWLER_MAX_CONTENT_BYTES", 10 * 1024 * 1024)?,
            embedding_model: optional("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimensions: parsed("EMBEDDING_DIMENSIONS", 1536)?,
            qa_rate_limit_per_minute: parsed("QA_RATE_LIMIT_PER_MINUTE", 10)?,
            retry: RetryConfig::default(),
        })
    }
}

fn required(name: &str) -> Result<String, AskpageError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(AskpageError::Config(format!("{} is not set", name))),
    }
}

fn optional(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AskpageError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map_err(|_| AskpageError::Config(format!("{} is not a valid value: {}", name, v))),
        _ => Ok(default),
    }
}

/// Retry parameters for outbound provider calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Per-publisher pipeline configuration, stored as JSON on the publisher row
/// and snapshotted onto jobs at enqueue time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Questions to generate per blog (clamped to 1–20 at use sites).
    #[serde(default = "default_questions_per_blog")]
    pub questions_per_blog: u32,
    #[serde(default = "default_model")]
    pub summary_model: String,
    #[serde(default = "default_model")]
    pub questions_model: String,
    #[serde(default = "default_model")]
    pub chat_model: String,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
    #[serde(default = "default_questions_max_tokens")]
    pub questions_max_tokens: u32,
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub summary_temperature: f64,
    #[serde(default = "default_temperature")]
    pub questions_temperature: f64,
    #[serde(default = "default_temperature")]
    pub chat_temperature: f64,
    /// Honored only when the dispatched provider supports grounding;
    /// silently false otherwise.
    #[serde(default)]
    pub use_grounding: bool,
    /// Per-UTC-calendar-day enqueue limit. None = unlimited.
    #[serde(default)]
    pub daily_blog_limit: Option<u32>,
    /// Lifetime blog limit. None = unlimited.
    #[serde(default)]
    pub max_total_blogs: Option<u32>,
    /// Number of redundant enqueue requests required before the pipeline
    /// actually runs.
    #[serde(default)]
    pub threshold_before_processing_blog: u32,
    /// URL prefixes that may be processed. Empty = allow all.
    #[serde(default)]
    pub whitelisted_blog_urls: Vec<String>,
    #[serde(default)]
    pub custom_question_prompt: Option<String>,
    #[serde(default)]
    pub custom_summary_prompt: Option<String>,
}

fn default_questions_per_blog() -> u32 {
    5
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_summary_max_tokens() -> u32 {
    1024
}

fn default_questions_max_tokens() -> u32 {
    2048
}

fn default_chat_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            questions_per_blog: default_questions_per_blog(),
            summary_model: default_model(),
            questions_model: default_model(),
            chat_model: default_model(),
            summary_max_tokens: default_summary_max_tokens(),
            questions_max_tokens: default_questions_max_tokens(),
            chat_max_tokens: default_chat_max_tokens(),
            summary_temperature: default_temperature(),
            questions_temperature: default_temperature(),
            chat_temperature: default_temperature(),
            use_grounding: false,
            daily_blog_limit: None,
            max_total_blogs: None,
            threshold_before_processing_blog: 0,
            whitelisted_blog_urls: Vec::new(),
            custom_question_prompt: None,
            custom_summary_prompt: None,
        }
    }
}

impl PublisherConfig {
    /// Question count with the 1–20 bound applied.
    pub fn questions_per_blog_clamped(&self) -> usize {
        self.questions_per_blog.clamp(1, 20) as usize
    }

    /// Temperature with the provider-accepted bound applied.
    pub fn clamp_temperature(t: f64) -> f64 {
        t.clamp(0.0, 2.0)
    }

    /// Whitelist check. Both sides are compared in normalized form; an empty
    /// whitelist allows everything.
    pub fn allows_url(&self, normalized_url: &str) -> bool {
        if self.whitelisted_blog_urls.is_empty() {
            return true;
        }
        self.whitelisted_blog_urls.iter().any(|prefix| {
            let prefix = crate::url::normalize_url(prefix)
                .unwrap_or_else(|_| prefix.trim().to_string());
            normalized_url.starts_with(&prefix)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publisher_config_defaults() {
        let config = PublisherConfig::default();
        assert_eq!(config.questions_per_blog, 5);
        assert_eq!(config.summary_model, "gpt-4o-mini");
        assert_eq!(config.summary_temperature, 0.7);
        assert_eq!(config.threshold_before_processing_blog, 0);
        assert!(config.daily_blog_limit.is_none());
        assert!(config.max_total_blogs.is_none());
        assert!(config.whitelisted_blog_urls.is_empty());
        assert!(!config.use_grounding);
    }

    #[test]
    fn test_publisher_config_partial_json() {
        let config: PublisherConfig =
            serde_json::from_str(r#"{"questions_per_blog": 3, "daily_blog_limit": 100}"#).unwrap();
        assert_eq!(config.questions_per_blog, 3);
        assert_eq!(config.daily_blog_limit, Some(100));
        assert_eq!(config.chat_model, "gpt-4o-mini");
    }

    #[test]
    fn test_questions_clamped() {
        let mut config = PublisherConfig::default();
        config.questions_per_blog = 0;
        assert_eq!(config.questions_per_blog_clamped(), 1);
        config.questions_per_blog = 50;
        assert_eq!(config.questions_per_blog_clamped(), 20);
    }

    #[test]
    fn test_whitelist_empty_allows_all() {
        let config = PublisherConfig::default();
        assert!(config.allows_url("https://example.com/any"));
    }

    #[test]
    fn test_whitelist_prefix_match() {
        let mut config = PublisherConfig::default();
        config.whitelisted_blog_urls = vec!["https://www.example.com/blog/".to_string()];
        assert!(config.allows_url("https://example.com/blog/post-1"));
        assert!(!config.allows_url("https://example.com/news/post-1"));
        assert!(!config.allows_url("https://other.com/blog/post-1"));
    }
}
