mod publishers;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to PostgreSQL and return a shared connection pool.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    tracing::info!("Connecting to PostgreSQL");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    tracing::info!("PostgreSQL connection established");
    Ok(pool)
}

/// Run database migrations. Safe to run on every startup.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    tracing::info!("Running PostgreSQL migrations");

    sqlx::migrate!("src/store/migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    tracing::info!("PostgreSQL migrations complete");
    Ok(())
}

/// PostgreSQL client for the publisher registry. The registry shares a pool
/// with the job/content collections but never a transaction: cross-store
/// consistency is kept by compensating actions (reserve, then release).
#[derive(Clone)]
pub struct PublisherStore {
    pool: PgPool,
}

impl PublisherStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Verify the connection is alive.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("PostgreSQL connection error: {0}")]
    Connection(String),

    #[error("PostgreSQL query error: {0}")]
    Query(String),

    #[error("PostgreSQL migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
}

impl From<StoreError> for askpage_common::AskpageError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => askpage_common::AskpageError::NotFound(m),
            StoreError::Duplicate(m) => askpage_common::AskpageError::Validation(m),
            StoreError::QuotaExceeded(m) => askpage_common::AskpageError::QuotaExceeded(m),
            other => askpage_common::AskpageError::Postgres(other.to_string()),
        }
    }
}
