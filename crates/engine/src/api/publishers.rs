//! Publisher onboarding (admin) and the unauthenticated widget metadata
//! lookup.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use askpage_common::api::{ApiErrorCode, OnboardRequest, OnboardResult, PublisherMetadataDto};
use askpage_common::ids::PublisherId;
use askpage_common::types::{Publisher, PublisherStatus};
use askpage_common::url::domain_of;

use super::{auth, ok, settle, ApiError, ApiResponse, AppState, RequestId};

/// POST /api/v1/publishers/onboard — admin only. Returns the freshly minted
/// API key exactly once; only its digest is stored.
pub async fn onboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<OnboardRequest>,
) -> ApiResponse {
    let result = async {
        auth::require_admin(&state, &headers)?;

        let domain = canonicalize_domain(&body.domain)?;
        if body.email.trim().is_empty() {
            return Err(ApiError::new(
                ApiErrorCode::ValidationError,
                "email must not be empty",
            ));
        }

        let api_key = auth::generate_publisher_key();
        let now = Utc::now();

        let publisher = Publisher {
            id: PublisherId::new(),
            domain: domain.clone(),
            email: body.email.trim().to_string(),
            status: PublisherStatus::Active,
            api_key_hash: auth::hash_key(&api_key),
            admin_api_key_ref: None,
            subscription_tier: body
                .subscription_tier
                .unwrap_or_else(|| "free".to_string()),
            config: body.config.unwrap_or_default(),
            widget_config: body.widget_config.unwrap_or_else(|| json!({})),
            total_blogs_processed: 0,
            blog_slots_reserved: 0,
            total_questions_generated: 0,
            created_at: now,
            updated_at: now,
            last_active_at: None,
        };

        state.store.create_publisher(&publisher).await?;

        tracing::info!(publisher_id = %publisher.id, domain = %domain, "Publisher onboarded");
        metrics::counter!("publishers.onboarded").increment(1);

        let result = OnboardResult {
            publisher_id: publisher.id,
            domain,
            api_key,
        };
        Ok(ok(
            &request_id,
            "publisher onboarded",
            serde_json::to_value(&result).unwrap_or_else(|_| json!({})),
        ))
    }
    .await;

    settle(&request_id, result)
}

#[derive(Deserialize)]
pub struct MetadataParams {
    blog_url: String,
}

/// GET /api/v1/publishers/metadata — unauthenticated; returns widget-safe
/// fields for the publisher serving the URL's domain. A subdomain request
/// matches a publisher registered at the apex (longest label-boundary
/// suffix wins). 404 for unknown or non-serving publishers.
pub async fn metadata_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<MetadataParams>,
) -> ApiResponse {
    let result = async {
        let domain = domain_of(&params.blog_url)
            .map_err(|e| ApiError::new(ApiErrorCode::ValidationError, e.to_string()))?;

        let publisher = state
            .store
            .get_by_domain(&domain, true)
            .await?
            .filter(|p| p.status.is_serving())
            .ok_or_else(|| {
                ApiError::new(
                    ApiErrorCode::NotFound,
                    format!("no active publisher for domain {}", domain),
                )
            })?;

        let result = PublisherMetadataDto {
            domain: publisher.domain,
            subscription_tier: publisher.subscription_tier,
            widget_config: publisher.widget_config,
        };
        Ok(ok(
            &request_id,
            "publisher metadata",
            serde_json::to_value(&result).unwrap_or_else(|_| json!({})),
        ))
    }
    .await;

    settle(&request_id, result)
}

/// Canonical publisher domain: lower-cased, no scheme, no leading `www.`,
/// no path.
fn canonicalize_domain(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Err(ApiError::new(
            ApiErrorCode::ValidationError,
            "domain must not be empty",
        ));
    }

    let domain = if trimmed.contains("://") {
        domain_of(&trimmed)
            .map_err(|e| ApiError::new(ApiErrorCode::ValidationError, e.to_string()))?
    } else {
        let host = trimmed
            .split('/')
            .next()
            .unwrap_or_default()
            .trim_start_matches("www.")
            .to_string();
        if host.is_empty() || !host.contains('.') {
            return Err(ApiError::new(
                ApiErrorCode::ValidationError,
                format!("not a valid domain: {}", raw),
            ));
        }
        host
    };

    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_domain() {
        assert_eq!(canonicalize_domain("Example.com").unwrap(), "example.com");
        assert_eq!(
            canonicalize_domain("www.example.com").unwrap(),
            "example.com"
        );
        assert_eq!(
            canonicalize_domain("https://www.Example.com/about").unwrap(),
            "example.com"
        );
        assert!(canonicalize_domain("").is_err());
        assert!(canonicalize_domain("nodot").is_err());
    }
}
