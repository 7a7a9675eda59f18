//! HTTP surface: routing, shared state, request-id propagation, and the
//! response envelope plumbing. Handler semantics live in the sibling
//! modules.

pub mod auth;
mod jobs;
mod publishers;
mod qa;
mod questions;
pub mod rate_limit;
mod search;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use askpage_common::api::{ApiErrorCode, Envelope};
use askpage_common::config::Config;

use crate::docs::DocStore;
use crate::llm::LlmClient;
use crate::queue::JobQueue;
use crate::store::PublisherStore;

/// Shared application state accessible from axum handlers. Constructed once
/// at startup and passed by reference; no globals.
pub struct AppState {
    pub config: Config,
    pub store: PublisherStore,
    pub docs: DocStore,
    pub queue: JobQueue,
    pub llm: Arc<LlmClient>,
    pub qa_limiter: rate_limit::QaRateLimiter,
    /// SHA-256 hex digest of the operator key; the key itself is dropped
    /// after hashing.
    pub admin_key_hash: String,
    pub metrics_handle: PrometheusHandle,
}

/// The request id assigned (or propagated) by the middleware.
#[derive(Clone)]
pub struct RequestId(pub String);

/// Handler-level error carrying the envelope error code.
#[derive(Debug)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Internal error: the cause is logged, the caller sees only `internal`.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "Internal error");
        Self::new(ApiErrorCode::Internal, "internal error")
    }
}

impl From<crate::store::StoreError> for ApiError {
    fn from(e: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match e {
            StoreError::NotFound(m) => Self::new(ApiErrorCode::NotFound, m),
            StoreError::Duplicate(m) => Self::new(ApiErrorCode::Duplicate, m),
            StoreError::QuotaExceeded(m) => Self::new(ApiErrorCode::QuotaExceeded, m),
            other => Self::internal(other),
        }
    }
}

impl From<crate::docs::DocStoreError> for ApiError {
    fn from(e: crate::docs::DocStoreError) -> Self {
        use crate::docs::DocStoreError;
        match e {
            DocStoreError::NotFound(m) => Self::new(ApiErrorCode::NotFound, m),
            other => Self::internal(other),
        }
    }
}

impl From<crate::queue::QueueError> for ApiError {
    fn from(e: crate::queue::QueueError) -> Self {
        use crate::queue::QueueError;
        match e {
            QueueError::NotFound(id) => {
                Self::new(ApiErrorCode::NotFound, format!("Job {}", id))
            }
            QueueError::InvalidState(m) => Self::new(ApiErrorCode::ValidationError, m),
            other => Self::internal(other),
        }
    }
}

/// Enveloped response type returned by every handler.
pub type ApiResponse = (StatusCode, Json<Envelope>);

pub(crate) fn ok(request_id: &RequestId, message: &str, result: Value) -> ApiResponse {
    respond(StatusCode::OK, request_id, message, result)
}

pub(crate) fn respond(
    status: StatusCode,
    request_id: &RequestId,
    message: &str,
    result: Value,
) -> ApiResponse {
    (
        status,
        Json(Envelope::success(
            request_id.0.clone(),
            status.as_u16(),
            message,
            result,
        )),
    )
}

pub(crate) fn err(request_id: &RequestId, error: ApiError) -> ApiResponse {
    let status =
        StatusCode::from_u16(error.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(Envelope::error(
            request_id.0.clone(),
            error.code,
            error.message,
        )),
    )
}

/// Collapse a `Result` from an inner handler into the envelope.
pub(crate) fn settle(
    request_id: &RequestId,
    result: Result<ApiResponse, ApiError>,
) -> ApiResponse {
    match result {
        Ok(response) => response,
        Err(error) => err(request_id, error),
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/api/v1/questions/check-and-load",
            get(questions::check_and_load_handler),
        )
        .route("/api/v1/questions/by-url", get(questions::by_url_handler))
        .route(
            "/api/v1/questions/{id}",
            get(questions::get_question_handler).delete(questions::delete_blog_handler),
        )
        .route("/api/v1/jobs/process", post(jobs::process_handler))
        .route("/api/v1/jobs/status/{job_id}", get(jobs::status_handler))
        .route("/api/v1/jobs/stats", get(jobs::stats_handler))
        .route("/api/v1/jobs/cancel/{job_id}", post(jobs::cancel_handler))
        .route("/api/v1/search/similar", post(search::similar_handler))
        .route("/api/v1/qa/ask", post(qa::ask_handler))
        .route(
            "/api/v1/publishers/onboard",
            post(publishers::onboard_handler),
        )
        .route(
            "/api/v1/publishers/metadata",
            get(publishers::metadata_handler),
        )
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Assign or propagate a request id, attach it to the tracing span and the
/// response headers.
async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Health check endpoint. Reports per-component status.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry_ok = state.store.health_check().await.is_ok();
    let docs_ok = state.docs.health_check().await.is_ok();
    let queue_ok = state.queue.health_check().await.is_ok();

    let all_healthy = registry_ok && docs_ok && queue_ok;

    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": if all_healthy { "healthy" } else { "unhealthy" },
        "components": {
            "publisher_registry": if registry_ok { "healthy" } else { "unhealthy" },
            "content_store": if docs_ok { "healthy" } else { "unhealthy" },
            "job_queue": if queue_ok { "healthy" } else { "unhealthy" },
        },
        "worker_pool_size": state.config.worker_pool_size,
    });

    (status, Json(body))
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
