//! API key authentication.
//!
//! Two header families: `X-API-Key: pub_…` identifies a publisher,
//! `X-Admin-Key` identifies an operator. Keys are never stored or compared
//! in the clear — both sides are reduced to SHA-256 digests first, which
//! also makes the comparison timing-independent of the key contents.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use askpage_common::api::ApiErrorCode;
use askpage_common::types::Publisher;

use super::{ApiError, AppState};

const PUBLISHER_KEY_PREFIX: &str = "pub_";

/// SHA-256 hex digest of an API key.
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Mint a fresh publisher API key.
pub fn generate_publisher_key() -> String {
    format!("{}{}", PUBLISHER_KEY_PREFIX, Uuid::new_v4().simple())
}

/// Resolve the publisher for a request from its `X-API-Key` header.
pub async fn authenticate_publisher(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Publisher, ApiError> {
    let key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::new(ApiErrorCode::Unauthorized, "missing X-API-Key header")
        })?;

    if !key.starts_with(PUBLISHER_KEY_PREFIX) {
        return Err(ApiError::new(ApiErrorCode::Unauthorized, "invalid API key"));
    }

    let publisher = state
        .store
        .get_by_api_key_hash(&hash_key(key))
        .await?
        .ok_or_else(|| ApiError::new(ApiErrorCode::Unauthorized, "invalid API key"))?;

    if !publisher.status.is_serving() {
        return Err(ApiError::new(
            ApiErrorCode::Forbidden,
            format!(
                "publisher account is {}",
                publisher.status.as_db_str()
            ),
        ));
    }

    if let Err(e) = state.store.touch_last_active(publisher.id).await {
        tracing::warn!(publisher_id = %publisher.id, error = %e, "Failed to touch last_active_at");
    }

    Ok(publisher)
}

/// Verify the operator key in `X-Admin-Key`.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let key = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::new(ApiErrorCode::Unauthorized, "missing X-Admin-Key header")
        })?;

    if hash_key(key) != state.admin_key_hash {
        return Err(ApiError::new(ApiErrorCode::Unauthorized, "invalid admin key"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_is_stable_hex() {
        let a = hash_key("pub_abc");
        let b = hash_key("pub_abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash_key("pub_abc"), hash_key("pub_abd"));
    }

    #[test]
    fn test_generated_key_shape() {
        let key = generate_publisher_key();
        assert!(key.starts_with("pub_"));
        assert_eq!(key.len(), 4 + 32);
        assert_ne!(generate_publisher_key(), generate_publisher_key());
    }
}
