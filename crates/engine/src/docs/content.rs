use chrono::{DateTime, Utc};
use uuid::Uuid;

use askpage_common::ids::BlogId;
use askpage_common::types::BlogContent;

use super::{DocStore, DocStoreError};

impl DocStore {
    /// Store freshly crawled content. If the URL already exists the stored
    /// row wins — content is written once and only `triggered_count`
    /// changes afterwards. Returns the canonical row.
    pub async fn insert_content(&self, content: &BlogContent) -> Result<BlogContent, DocStoreError> {
        sqlx::query(
            r#"
            INSERT INTO raw_blog_content (id, url, title, author, published_date,
                                          word_count, extracted_text, triggered_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (url) DO NOTHING
            "#,
        )
        .bind(content.id.0)
        .bind(&content.url)
        .bind(&content.title)
        .bind(&content.author)
        .bind(&content.published_date)
        .bind(content.word_count)
        .bind(&content.extracted_text)
        .bind(content.triggered_count)
        .bind(content.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        self.get_content_by_url(&content.url)
            .await?
            .ok_or_else(|| DocStoreError::NotFound(format!("BlogContent {}", content.url)))
    }

    /// Retrieve crawled content by normalized URL.
    pub async fn get_content_by_url(&self, url: &str) -> Result<Option<BlogContent>, DocStoreError> {
        let row = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT id, url, title, author, published_date, word_count,
                   extracted_text, triggered_count, created_at
            FROM raw_blog_content
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Retrieve crawled content by ID.
    pub async fn get_content_by_id(&self, id: BlogId) -> Result<Option<BlogContent>, DocStoreError> {
        let row = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT id, url, title, author, published_date, word_count,
                   extracted_text, triggered_count, created_at
            FROM raw_blog_content
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Atomically bump the trigger counter and return the post-increment
    /// value. The threshold gate is evaluated on this returned value, so
    /// concurrent readers observing an older count still behave correctly.
    pub async fn increment_triggered(&self, url: &str) -> Result<i32, DocStoreError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE raw_blog_content
            SET triggered_count = triggered_count + 1
            WHERE url = $1
            RETURNING triggered_count
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        row.map(|(count,)| count)
            .ok_or_else(|| DocStoreError::NotFound(format!("BlogContent {}", url)))
    }

    /// Delete a blog and everything derived from it: content, summary, and
    /// all questions. Job history is retained. Returns the number of
    /// questions removed.
    pub async fn delete_blog(&self, url: &str) -> Result<u64, DocStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;

        let questions = sqlx::query("DELETE FROM processed_questions WHERE blog_url = $1")
            .bind(url)
            .execute(&mut *tx)
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?
            .rows_affected();

        sqlx::query("DELETE FROM blog_summaries WHERE blog_url = $1")
            .bind(url)
            .execute(&mut *tx)
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM raw_blog_content WHERE url = $1")
            .bind(url)
            .execute(&mut *tx)
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;

        tracing::info!(url, questions, "Deleted blog and derived artifacts");
        Ok(questions)
    }
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct ContentRow {
    id: Uuid,
    url: String,
    title: Option<String>,
    author: Option<String>,
    published_date: Option<String>,
    word_count: i32,
    extracted_text: String,
    triggered_count: i32,
    created_at: DateTime<Utc>,
}

impl From<ContentRow> for BlogContent {
    fn from(row: ContentRow) -> Self {
        Self {
            id: BlogId::from_uuid(row.id),
            url: row.url,
            title: row.title,
            author: row.author,
            published_date: row.published_date,
            word_count: row.word_count,
            extracted_text: row.extracted_text,
            triggered_count: row.triggered_count,
            created_at: row.created_at,
        }
    }
}
