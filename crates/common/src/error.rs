use thiserror::Error;

/// Top-level error type for askpage operations.
#[derive(Debug, Error)]
pub enum AskpageError {
    // --- Hard dependency errors (system cannot function) ---
    #[error("PostgreSQL error: {0}")]
    Postgres(String),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Embedding API error: {0}")]
    Embedding(String),

    // --- Per-job errors (job fails, system keeps running) ---
    #[error("Crawl error: {0}")]
    Crawl(String),

    // --- Operational errors ---
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

/// Result type alias for askpage operations.
pub type Result<T> = std::result::Result<T, AskpageError>;
