//! Job handlers: enqueue, status, stats, cancel.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde_json::json;
use uuid::Uuid;

use askpage_common::api::ProcessRequest;
use askpage_common::ids::JobId;

use super::{auth, ok, questions, respond, settle, ApiResponse, AppState, RequestId};

/// POST /api/v1/jobs/process — admin/batch enqueue path. Same semantics as
/// check-and-load but never returns question bodies; 202 + job state.
pub async fn process_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<ProcessRequest>,
) -> ApiResponse {
    let result = async {
        let publisher = auth::authenticate_publisher(&state, &headers).await?;
        let outcome =
            questions::run_check_and_load(&state, &publisher, &body.blog_url, false).await?;
        Ok(respond(
            StatusCode::ACCEPTED,
            &request_id,
            "enqueued",
            serde_json::to_value(&outcome).unwrap_or_default(),
        ))
    }
    .await;

    settle(&request_id, result)
}

/// GET /api/v1/jobs/status/{job_id} — full job record, admin only.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> ApiResponse {
    let result = async {
        auth::require_admin(&state, &headers)?;

        let job = state.queue.get_job(JobId::from_uuid(job_id)).await?;
        Ok(ok(
            &request_id,
            "job",
            serde_json::to_value(&job).unwrap_or_default(),
        ))
    }
    .await;

    settle(&request_id, result)
}

/// GET /api/v1/jobs/stats — grouped status counts, admin only.
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> ApiResponse {
    let result = async {
        auth::require_admin(&state, &headers)?;

        let counts = state.queue.stats().await?;
        let total: i64 = counts.values().sum();
        Ok(ok(
            &request_id,
            "job stats",
            json!({ "by_status": counts, "total": total }),
        ))
    }
    .await;

    settle(&request_id, result)
}

/// POST /api/v1/jobs/cancel/{job_id} — admin only; succeeds only while the
/// job is still queued. Cancellation releases the enqueue-time slot.
pub async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> ApiResponse {
    let result = async {
        auth::require_admin(&state, &headers)?;

        let job = state.queue.cancel(JobId::from_uuid(job_id)).await?;

        if let Some(publisher_id) = job.publisher_id {
            if let Err(e) = state.store.release_blog_slot(publisher_id, false).await {
                tracing::error!(
                    job_id = %job.job_id,
                    publisher_id = %publisher_id,
                    error = %e,
                    "Failed to release slot for cancelled job"
                );
            }
        }

        Ok(ok(
            &request_id,
            "job cancelled",
            serde_json::to_value(&job).unwrap_or_default(),
        ))
    }
    .await;

    settle(&request_id, result)
}
