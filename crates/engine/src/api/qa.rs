//! Ad-hoc question answering with the publisher's chat model. Strictly
//! rate-limited; answers are not cached.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde_json::json;

use askpage_common::api::{ApiErrorCode, AskRequest, AskResult};
use askpage_common::config::PublisherConfig;

use super::{auth, ok, settle, ApiError, ApiResponse, AppState, RequestId};
use crate::llm::{LlmError, TextRequest};

const CHAT_SYSTEM: &str = "You are a helpful assistant answering reader questions for a blog \
     publisher. Answer concisely and factually. If you do not know, say so.";

/// POST /api/v1/qa/ask
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<AskRequest>,
) -> ApiResponse {
    let result = async {
        let publisher = auth::authenticate_publisher(&state, &headers).await?;

        let question = body.question.trim();
        if question.is_empty() {
            return Err(ApiError::new(
                ApiErrorCode::ValidationError,
                "question must not be empty",
            ));
        }

        if !state.qa_limiter.try_acquire(publisher.id).await {
            return Err(ApiError::new(
                ApiErrorCode::RateLimited,
                "qa rate limit exceeded",
            ));
        }

        let config = &publisher.config;
        let request = TextRequest {
            model: &config.chat_model,
            system: CHAT_SYSTEM,
            user: question,
            max_tokens: config.chat_max_tokens,
            temperature: PublisherConfig::clamp_temperature(config.chat_temperature),
            grounding: config.use_grounding,
        };

        let answer = state.llm.generate_text(&request).await.map_err(|e| match e {
            LlmError::RateLimited { .. } => {
                ApiError::new(ApiErrorCode::RateLimited, "model provider rate limited")
            }
            other => ApiError::internal(other),
        })?;

        metrics::counter!("qa.ask.requests").increment(1);

        let result = AskResult {
            answer,
            model: config.chat_model.clone(),
        };
        Ok(ok(
            &request_id,
            "answer",
            serde_json::to_value(&result).unwrap_or_else(|_| json!({})),
        ))
    }
    .await;

    settle(&request_id, result)
}
