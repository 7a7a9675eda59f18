use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PublisherConfig;
use crate::ids::PublisherId;

/// Publisher account states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherStatus {
    Active,
    Inactive,
    Suspended,
    Trial,
}

impl PublisherStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::Trial => "trial",
        }
    }

    /// Whether this account may call the API and serve its widget.
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Active | Self::Trial)
    }
}

pub fn parse_publisher_status(s: &str) -> PublisherStatus {
    match s {
        "active" => PublisherStatus::Active,
        "inactive" => PublisherStatus::Inactive,
        "suspended" => PublisherStatus::Suspended,
        "trial" => PublisherStatus::Trial,
        other => {
            tracing::warn!(
                status = other,
                "Unknown publisher status, defaulting to Inactive"
            );
            PublisherStatus::Inactive
        }
    }
}

/// A publisher account in the relational registry.
///
/// Counter invariant: when `config.max_total_blogs` is set,
/// `total_blogs_processed + blog_slots_reserved` never exceeds it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Publisher {
    pub id: PublisherId,
    /// Canonical domain: lower-cased, no leading `www.`. Unique.
    pub domain: String,
    pub email: String,
    pub status: PublisherStatus,
    /// SHA-256 hex digest of the publisher API key. The key itself is never
    /// stored.
    #[serde(default, skip_serializing)]
    pub api_key_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_api_key_ref: Option<String>,
    pub subscription_tier: String,
    pub config: PublisherConfig,
    /// Opaque JSON passed through to the widget untouched.
    pub widget_config: Value,
    pub total_blogs_processed: i32,
    /// Slots held by in-flight jobs, from enqueue to terminal state.
    pub blog_slots_reserved: i32,
    pub total_questions_generated: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            PublisherStatus::Active,
            PublisherStatus::Inactive,
            PublisherStatus::Suspended,
            PublisherStatus::Trial,
        ] {
            assert_eq!(parse_publisher_status(status.as_db_str()), status);
        }
    }

    #[test]
    fn test_serving_states() {
        assert!(PublisherStatus::Active.is_serving());
        assert!(PublisherStatus::Trial.is_serving());
        assert!(!PublisherStatus::Inactive.is_serving());
        assert!(!PublisherStatus::Suspended.is_serving());
    }

    #[test]
    fn test_api_key_hash_never_serialized() {
        let publisher = Publisher {
            id: PublisherId::new(),
            domain: "example.com".into(),
            email: "owner@example.com".into(),
            status: PublisherStatus::Active,
            api_key_hash: "deadbeef".into(),
            admin_api_key_ref: None,
            subscription_tier: "free".into(),
            config: PublisherConfig::default(),
            widget_config: serde_json::json!({}),
            total_blogs_processed: 0,
            blog_slots_reserved: 0,
            total_questions_generated: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_active_at: None,
        };
        let json = serde_json::to_value(&publisher).unwrap();
        assert!(json.get("api_key_hash").is_none());
    }
}
