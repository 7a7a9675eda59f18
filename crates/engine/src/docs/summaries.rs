use chrono::{DateTime, Utc};
use pgvector::Vector;
use uuid::Uuid;

use askpage_common::ids::BlogId;
use askpage_common::types::Summary;

use super::{DocStore, DocStoreError};

/// A blog ranked by embedding similarity, scoped to one publisher domain.
#[derive(Debug, Clone)]
pub struct SimilarBlog {
    pub blog_id: BlogId,
    pub blog_url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub score: f64,
}

impl DocStore {
    /// Write the summary for a blog, replacing any previous one. Re-running
    /// a job therefore converges on the same stored state.
    pub async fn upsert_summary(&self, summary: &Summary) -> Result<(), DocStoreError> {
        let key_points = serde_json::to_value(&summary.key_points).unwrap_or_default();
        let embedding = summary.embedding.as_ref().map(|v| Vector::from(v.clone()));

        sqlx::query(
            r#"
            INSERT INTO blog_summaries (blog_url, domain, summary, key_points, embedding, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (blog_url) DO UPDATE
            SET domain = EXCLUDED.domain,
                summary = EXCLUDED.summary,
                key_points = EXCLUDED.key_points,
                embedding = EXCLUDED.embedding,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&summary.blog_url)
        .bind(&summary.domain)
        .bind(&summary.summary)
        .bind(&key_points)
        .bind(embedding)
        .bind(summary.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Retrieve a summary by normalized URL.
    pub async fn get_summary(&self, blog_url: &str) -> Result<Option<Summary>, DocStoreError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT blog_url, domain, summary, key_points, created_at
            FROM blog_summaries
            WHERE blog_url = $1
            "#,
        )
        .bind(blog_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Cosine-similarity search over summary embeddings, restricted to one
    /// publisher domain. A linear scan over the domain's summaries — fine at
    /// the expected corpus size.
    pub async fn search_similar(
        &self,
        embedding: &[f32],
        domain: &str,
        limit: i64,
    ) -> Result<Vec<SimilarBlog>, DocStoreError> {
        let query_vec = Vector::from(embedding.to_vec());

        let rows = sqlx::query_as::<_, SimilarRow>(
            r#"
            SELECT c.id AS blog_id, s.blog_url, c.title, c.author, c.published_date,
                   1 - (s.embedding <=> $1::vector) AS score
            FROM blog_summaries s
            JOIN raw_blog_content c ON c.url = s.blog_url
            WHERE s.domain = $2 AND s.embedding IS NOT NULL
            ORDER BY s.embedding <=> $1::vector
            LIMIT $3
            "#,
        )
        .bind(query_vec)
        .bind(domain)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| SimilarBlog {
                blog_id: BlogId::from_uuid(row.blog_id),
                blog_url: row.blog_url,
                title: row.title,
                author: row.author,
                published_date: row.published_date,
                score: row.score,
            })
            .collect())
    }
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct SummaryRow {
    blog_url: String,
    domain: String,
    summary: String,
    key_points: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<SummaryRow> for Summary {
    fn from(row: SummaryRow) -> Self {
        let key_points = serde_json::from_value(row.key_points).unwrap_or_default();
        Self {
            blog_url: row.blog_url,
            domain: row.domain,
            summary: row.summary,
            key_points,
            embedding: None, // Not retrieved in reads (large)
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SimilarRow {
    blog_id: Uuid,
    blog_url: String,
    title: Option<String>,
    author: Option<String>,
    published_date: Option<String>,
    score: f64,
}
