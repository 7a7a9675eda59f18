//! Content collections: crawled blog text, generated summaries, and
//! generated questions. Keyed by normalized URL throughout.
//!
//! The API reads these collections; the orchestrator writes them. Job state
//! lives in [`crate::queue`], not here.

mod content;
mod questions;
mod summaries;

pub use summaries::SimilarBlog;

use sqlx::PgPool;

/// Client for the blog content collections.
#[derive(Clone)]
pub struct DocStore {
    pool: PgPool,
}

impl DocStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Verify the connection is alive.
    pub async fn health_check(&self) -> Result<(), DocStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocStoreError {
    #[error("Content store query error: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<DocStoreError> for askpage_common::AskpageError {
    fn from(e: DocStoreError) -> Self {
        match e {
            DocStoreError::NotFound(m) => askpage_common::AskpageError::NotFound(m),
            other => askpage_common::AskpageError::Postgres(other.to_string()),
        }
    }
}
