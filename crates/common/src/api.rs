//! API response envelope and request/response DTOs shared between the HTTP
//! surface and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PublisherConfig;
use crate::ids::{BlogId, JobId, PublisherId, QuestionId};
use crate::types::{BlogContent, Question};

/// Stable error code symbols surfaced in the `error.code` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    Unauthorized,
    Forbidden,
    DomainMismatch,
    NotWhitelisted,
    NotFound,
    QuotaExceeded,
    DailyLimitExceeded,
    Duplicate,
    ValidationError,
    EmbeddingMissing,
    RateLimited,
    Internal,
}

impl ApiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::DomainMismatch => "domain_mismatch",
            Self::NotWhitelisted => "not_whitelisted",
            Self::NotFound => "not_found",
            Self::QuotaExceeded => "quota_exceeded",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
            Self::Duplicate => "duplicate",
            Self::ValidationError => "validation_error",
            Self::EmbeddingMissing => "embedding_missing",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden | Self::DomainMismatch | Self::NotWhitelisted => 403,
            Self::NotFound => 404,
            Self::Duplicate => 409,
            Self::QuotaExceeded | Self::DailyLimitExceeded | Self::RateLimited => 429,
            Self::ValidationError | Self::EmbeddingMissing => 400,
            Self::Internal => 500,
        }
    }
}

/// Error payload inside the envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ApiErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The envelope carried by every API response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// "success" or "error".
    pub status: String,
    pub status_code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn success(
        request_id: impl Into<String>,
        status_code: u16,
        message: impl Into<String>,
        result: Value,
    ) -> Self {
        Self {
            status: "success".into(),
            status_code,
            message: message.into(),
            result: Some(result),
            error: None,
            request_id: request_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(
        request_id: impl Into<String>,
        code: ApiErrorCode,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            status: "error".into(),
            status_code: code.http_status(),
            message: message.clone(),
            result: None,
            error: Some(ErrorBody {
                code,
                detail: Some(message),
            }),
            request_id: request_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Widget-facing processing state for a URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetState {
    Ready,
    Processing,
    NotStarted,
    Failed,
}

/// A question as served to the widget.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionDto {
    pub id: QuestionId,
    pub question: String,
    pub answer: String,
    pub icon: String,
    pub click_count: i32,
}

impl From<&Question> for QuestionDto {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question: q.question.clone(),
            answer: q.answer.clone(),
            icon: q.icon.clone(),
            click_count: q.click_count,
        }
    }
}

/// Public blog metadata attached to a `ready` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlogInfoDto {
    pub blog_id: BlogId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    pub word_count: i32,
}

impl From<&BlogContent> for BlogInfoDto {
    fn from(content: &BlogContent) -> Self {
        Self {
            blog_id: content.id,
            url: content.url.clone(),
            title: content.title.clone(),
            author: content.author.clone(),
            published_date: content.published_date.clone(),
            word_count: content.word_count,
        }
    }
}

/// Result of `CheckAndLoad` / `Enqueue`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckAndLoadResult {
    pub status: WidgetState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<QuestionDto>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_info: Option<BlogInfoDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub blog_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimilarRequest {
    pub question_id: QuestionId,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// A similar blog returned by the similarity search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimilarBlogDto {
    pub blog_id: BlogId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    pub score: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AskResult {
    pub answer: String,
    pub model: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnboardRequest {
    pub domain: String,
    pub email: String,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default)]
    pub config: Option<PublisherConfig>,
    #[serde(default)]
    pub widget_config: Option<Value>,
}

/// Onboarding response. The API key appears here exactly once; only its
/// digest is stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OnboardResult {
    pub publisher_id: PublisherId,
    pub domain: String,
    pub api_key: String,
}

/// Widget-safe publisher fields for the unauthenticated metadata endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublisherMetadataDto {
    pub domain: String,
    pub subscription_tier: String,
    pub widget_config: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_symbols() {
        assert_eq!(ApiErrorCode::DomainMismatch.as_str(), "domain_mismatch");
        assert_eq!(ApiErrorCode::DailyLimitExceeded.http_status(), 429);
        assert_eq!(ApiErrorCode::EmbeddingMissing.http_status(), 400);
    }

    #[test]
    fn test_envelope_success_shape() {
        let env = Envelope::success("req-1", 200, "ok", serde_json::json!({"x": 1}));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["status_code"], 200);
        assert_eq!(json["result"]["x"], 1);
        assert_eq!(json["request_id"], "req-1");
        assert!(json.get("error").is_none());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_envelope_error_shape() {
        let env = Envelope::error("req-2", ApiErrorCode::NotFound, "no such question");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["status_code"], 404);
        assert_eq!(json["error"]["code"], "not_found");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_widget_state_serialization() {
        assert_eq!(
            serde_json::to_value(WidgetState::NotStarted).unwrap(),
            "not_started"
        );
    }
}
