use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use askpage_common::config::Config;
use askpage_engine::api::{self, auth, rate_limit::QaRateLimiter, AppState};
use askpage_engine::crawler::Crawler;
use askpage_engine::docs::DocStore;
use askpage_engine::embeddings::EmbeddingClient;
use askpage_engine::llm::LlmClient;
use askpage_engine::orchestrator::Orchestrator;
use askpage_engine::queue::JobQueue;
use askpage_engine::store::{self, PublisherStore};
use askpage_engine::worker::{WorkerPool, WorkerPoolConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("askpage engine starting");

    // Load configuration — fail loudly on misconfiguration.
    let config = match Config::from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded");
            config
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration — refusing to start");
            std::process::exit(1);
        }
    };

    // Install Prometheus metrics recorder.
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    // PostgreSQL: one pool shared by the publisher registry, the content
    // collections, and the job queue.
    let pool = match store::connect_pool(&config.database_url, config.database_max_connections)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            std::process::exit(1);
        }
    };

    if let Err(e) = store::migrate(&pool).await {
        tracing::error!(error = %e, "Failed to run PostgreSQL migrations");
        std::process::exit(1);
    }

    let publisher_store = PublisherStore::new(pool.clone());
    let doc_store = DocStore::new(pool.clone());
    let job_queue = JobQueue::new(pool);

    tracing::info!("Database connected and migrated");

    let llm = Arc::new(LlmClient::from_env(config.retry.clone()));
    let embeddings = Arc::new(EmbeddingClient::new(&config));

    let crawler = Crawler::new(
        Duration::from_secs(config.crawler_timeout_seconds),
        config.crawler_max_content_bytes,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        publisher_store.clone(),
        doc_store.clone(),
        job_queue.clone(),
        Arc::clone(&llm),
        Arc::clone(&embeddings),
        crawler,
    ));

    // Worker pool. Size 0 runs this process as API-only.
    let _worker_pool = if config.worker_pool_size > 0 {
        Some(WorkerPool::start(
            WorkerPoolConfig {
                pool_size: config.worker_pool_size,
                poll_interval: Duration::from_secs(config.poll_interval_seconds),
                stale_lease: Duration::from_secs(config.stale_lease_seconds),
            },
            Arc::clone(&orchestrator),
            job_queue.clone(),
            publisher_store.clone(),
        ))
    } else {
        tracing::info!("WORKER_POOL_SIZE=0 — worker pool not started");
        None
    };

    let admin_key_hash = auth::hash_key(&config.admin_api_key);
    let port = config.engine_port;
    let qa_limiter = QaRateLimiter::new(config.qa_rate_limit_per_minute);

    let state = Arc::new(AppState {
        config,
        store: publisher_store,
        docs: doc_store,
        queue: job_queue,
        llm,
        qa_limiter,
        admin_key_hash,
        metrics_handle,
    });

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!(port, "askpage engine listening");

    axum::serve(listener, app).await.expect("HTTP server error");
}
