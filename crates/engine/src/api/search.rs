//! Similarity search over stored embeddings, scoped to the caller's domain.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde_json::json;

use askpage_common::api::{ApiErrorCode, SimilarBlogDto, SimilarRequest};
use askpage_common::url::domain_of;

use super::{auth, ok, settle, ApiError, ApiResponse, AppState, RequestId};

const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 20;

/// POST /api/v1/search/similar — blogs most similar to a question, ranked
/// by cosine similarity of the question embedding against the publisher's
/// own summary embeddings.
pub async fn similar_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<SimilarRequest>,
) -> ApiResponse {
    let result = async {
        let publisher = auth::authenticate_publisher(&state, &headers).await?;
        let limit = body.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let question = state
            .docs
            .get_question(body.question_id)
            .await?
            .ok_or_else(|| {
                ApiError::new(
                    ApiErrorCode::NotFound,
                    format!("Question {}", body.question_id),
                )
            })?;

        let question_domain = domain_of(&question.blog_url)
            .map_err(|e| ApiError::new(ApiErrorCode::ValidationError, e.to_string()))?;
        if question_domain != publisher.domain {
            return Err(ApiError::new(
                ApiErrorCode::Forbidden,
                "question belongs to a different publisher domain",
            ));
        }

        state.docs.increment_click_count(question.id).await?;
        metrics::counter!("search.similar.requests").increment(1);

        let embedding = question.embedding.as_deref().ok_or_else(|| {
            ApiError::new(
                ApiErrorCode::EmbeddingMissing,
                "question has no stored embedding",
            )
        })?;

        let similar = state
            .docs
            .search_similar(embedding, &publisher.domain, i64::from(limit))
            .await?;

        let results: Vec<SimilarBlogDto> = similar
            .into_iter()
            .map(|blog| SimilarBlogDto {
                blog_id: blog.blog_id,
                url: blog.blog_url,
                title: blog.title,
                author: blog.author,
                published_date: blog.published_date,
                score: blog.score,
            })
            .collect();

        Ok(ok(
            &request_id,
            "similar blogs",
            json!({ "question_id": question.id, "results": results }),
        ))
    }
    .await;

    settle(&request_id, result)
}
