use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BlogId, QuestionId};

/// Crawled blog content, keyed by normalized URL. Written once by the
/// crawler; only `triggered_count` changes afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlogContent {
    pub id: BlogId,
    /// Normalized URL. Unique.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Publication date as extracted from page metadata, unparsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    pub word_count: i32,
    pub extracted_text: String,
    /// Monotone counter of enqueue requests, used for threshold gating.
    pub triggered_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Generated summary for a blog, one per normalized URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Summary {
    pub blog_url: String,
    /// Publisher domain derived from `blog_url` at write time; scopes
    /// similarity search to the caller's own blogs.
    pub domain: String,
    pub summary: String,
    pub key_points: Vec<String>,
    /// Embedding of the article's main text. Fixed dimension within a
    /// deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// A generated question/answer pair for a blog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub blog_url: String,
    /// The owning BlogContent id; identical for every question of a URL.
    pub blog_id: BlogId,
    pub question: String,
    pub answer: String,
    /// Short glyph shown next to the question in the widget.
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub click_count: i32,
    pub created_at: DateTime<Utc>,
}
