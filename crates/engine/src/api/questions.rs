//! Question-serving handlers: the widget fast path (`check-and-load`),
//! direct question reads, and blog deletion.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Extension;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use askpage_common::api::{
    ApiErrorCode, BlogInfoDto, CheckAndLoadResult, QuestionDto, WidgetState,
};
use askpage_common::ids::{BlogId, QuestionId};
use askpage_common::types::{JobStatus, Publisher};
use askpage_common::url::{domain_of, normalize_url};

use super::{auth, ok, settle, ApiError, ApiResponse, AppState, RequestId};

#[derive(Deserialize)]
pub struct CheckAndLoadParams {
    blog_url: String,
}

#[derive(Deserialize)]
pub struct ByUrlParams {
    blog_url: String,
    #[serde(default)]
    randomize: bool,
}

/// GET /api/v1/questions/check-and-load — the widget fast path.
pub async fn check_and_load_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Query(params): Query<CheckAndLoadParams>,
) -> ApiResponse {
    let result = async {
        let publisher = auth::authenticate_publisher(&state, &headers).await?;
        let outcome = run_check_and_load(&state, &publisher, &params.blog_url, true).await?;
        Ok(ok(
            &request_id,
            "check-and-load",
            serde_json::to_value(&outcome).unwrap_or_default(),
        ))
    }
    .await;

    settle(&request_id, result)
}

/// The shared check-and-load flow, also backing the admin/batch enqueue
/// path (which never returns question bodies).
///
/// Guarantees at most one concurrent job per URL: job creation goes through
/// the queue's race-safe find-or-insert, and a lost race returns the
/// winner's job id with the speculative slot reservation rolled back.
pub(super) async fn run_check_and_load(
    state: &AppState,
    publisher: &Publisher,
    raw_url: &str,
    include_questions: bool,
) -> Result<CheckAndLoadResult, ApiError> {
    let blog_url = normalize_url(raw_url)
        .map_err(|e| ApiError::new(ApiErrorCode::ValidationError, e.to_string()))?;
    let url_domain = domain_of(&blog_url)
        .map_err(|e| ApiError::new(ApiErrorCode::ValidationError, e.to_string()))?;

    if url_domain != publisher.domain {
        return Err(ApiError::new(
            ApiErrorCode::DomainMismatch,
            format!(
                "URL domain {} does not match publisher domain {}",
                url_domain, publisher.domain
            ),
        ));
    }

    if !publisher.config.allows_url(&blog_url) {
        return Err(ApiError::new(
            ApiErrorCode::NotWhitelisted,
            "URL is not on the publisher whitelist",
        ));
    }

    // Cache hit: artifacts exist, no job is created.
    let questions = state.docs.questions_by_url(&blog_url, false).await?;
    if !questions.is_empty() {
        let blog_info = state
            .docs
            .get_content_by_url(&blog_url)
            .await?
            .map(|content| BlogInfoDto::from(&content));

        return Ok(CheckAndLoadResult {
            status: WidgetState::Ready,
            job_id: None,
            questions: include_questions
                .then(|| questions.iter().map(QuestionDto::from).collect()),
            blog_info,
        });
    }

    // In flight: join the existing job. A terminal skip folds into a fresh
    // attempt below; a dead-lettered job is reported as failed.
    if let Some(job) = state.queue.find_active_job(&blog_url).await? {
        return Ok(CheckAndLoadResult {
            status: WidgetState::Processing,
            job_id: Some(job.job_id),
            questions: None,
            blog_info: None,
        });
    }

    if let Some(latest) = state.queue.find_latest_job(&blog_url).await? {
        if latest.status == JobStatus::Failed {
            return Ok(CheckAndLoadResult {
                status: WidgetState::Failed,
                job_id: Some(latest.job_id),
                questions: None,
                blog_info: None,
            });
        }
    }

    // Daily limit counts completed jobs in the current UTC day.
    if let Some(limit) = publisher.config.daily_blog_limit {
        let start_of_day = Utc::now()
            .date_naive()
            .and_time(chrono::NaiveTime::MIN)
            .and_utc();
        let completed_today = state
            .queue
            .count_completed_since(publisher.id, start_of_day)
            .await?;
        if completed_today >= i64::from(limit) {
            return Err(ApiError::new(
                ApiErrorCode::DailyLimitExceeded,
                format!("daily blog limit of {} reached", limit),
            ));
        }
    }

    // Reserve a slot, then create the job; roll the reservation back on any
    // path that does not own a fresh job.
    state.store.reserve_blog_slot(publisher.id).await?;

    let config_snapshot = serde_json::to_value(&publisher.config).unwrap_or_else(|_| json!({}));
    match state
        .queue
        .create_job(&blog_url, Some(publisher.id), &config_snapshot)
        .await
    {
        Ok((job, true)) => Ok(CheckAndLoadResult {
            status: WidgetState::NotStarted,
            job_id: Some(job.job_id),
            questions: None,
            blog_info: None,
        }),
        Ok((job, false)) => {
            release_speculative_slot(state, publisher).await;
            Ok(CheckAndLoadResult {
                status: WidgetState::Processing,
                job_id: Some(job.job_id),
                questions: None,
                blog_info: None,
            })
        }
        Err(e) => {
            release_speculative_slot(state, publisher).await;
            Err(e.into())
        }
    }
}

async fn release_speculative_slot(state: &AppState, publisher: &Publisher) {
    if let Err(e) = state.store.release_blog_slot(publisher.id, false).await {
        tracing::error!(
            publisher_id = %publisher.id,
            error = %e,
            "Failed to roll back speculative slot reservation"
        );
    }
}

/// GET /api/v1/questions/by-url — stored questions in insertion or random
/// order.
pub async fn by_url_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Query(params): Query<ByUrlParams>,
) -> ApiResponse {
    let result = async {
        let publisher = auth::authenticate_publisher(&state, &headers).await?;

        let blog_url = normalize_url(&params.blog_url)
            .map_err(|e| ApiError::new(ApiErrorCode::ValidationError, e.to_string()))?;
        let url_domain = domain_of(&blog_url)
            .map_err(|e| ApiError::new(ApiErrorCode::ValidationError, e.to_string()))?;
        if url_domain != publisher.domain {
            return Err(ApiError::new(
                ApiErrorCode::DomainMismatch,
                format!(
                    "URL domain {} does not match publisher domain {}",
                    url_domain, publisher.domain
                ),
            ));
        }

        let questions = state
            .docs
            .questions_by_url(&blog_url, params.randomize)
            .await?;
        if questions.is_empty() {
            return Err(ApiError::new(
                ApiErrorCode::NotFound,
                "no questions stored for this URL",
            ));
        }

        let dtos: Vec<QuestionDto> = questions.iter().map(QuestionDto::from).collect();
        Ok(ok(
            &request_id,
            "questions",
            json!({ "blog_url": blog_url, "questions": dtos }),
        ))
    }
    .await;

    settle(&request_id, result)
}

/// GET /api/v1/questions/{id} — single question, admin only.
pub async fn get_question_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResponse {
    let result = async {
        auth::require_admin(&state, &headers)?;

        let question = state
            .docs
            .get_question(QuestionId::from_uuid(id))
            .await?
            .ok_or_else(|| ApiError::new(ApiErrorCode::NotFound, format!("Question {}", id)))?;

        Ok(ok(
            &request_id,
            "question",
            json!({
                "id": question.id,
                "blog_url": question.blog_url,
                "blog_id": question.blog_id,
                "question": question.question,
                "answer": question.answer,
                "icon": question.icon,
                "click_count": question.click_count,
                "has_embedding": question.embedding.is_some(),
                "created_at": question.created_at,
            }),
        ))
    }
    .await;

    settle(&request_id, result)
}

/// DELETE /api/v1/questions/{id} — delete a blog (content, summary,
/// questions) by blog id, admin only. Job history is retained.
pub async fn delete_blog_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResponse {
    let result = async {
        auth::require_admin(&state, &headers)?;

        let content = state
            .docs
            .get_content_by_id(BlogId::from_uuid(id))
            .await?
            .ok_or_else(|| ApiError::new(ApiErrorCode::NotFound, format!("Blog {}", id)))?;

        let deleted_questions = state.docs.delete_blog(&content.url).await?;

        Ok(ok(
            &request_id,
            "blog deleted",
            json!({
                "blog_id": content.id,
                "blog_url": content.url,
                "deleted_questions": deleted_questions,
            }),
        ))
    }
    .await;

    settle(&request_id, result)
}
