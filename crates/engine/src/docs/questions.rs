use chrono::{DateTime, Utc};
use pgvector::Vector;
use uuid::Uuid;

use askpage_common::ids::{BlogId, QuestionId};
use askpage_common::types::Question;

use super::{DocStore, DocStoreError};

impl DocStore {
    /// Replace the stored question set for a blog. Delete-then-insert in a
    /// single transaction keeps job re-runs idempotent.
    pub async fn replace_questions(&self, questions: &[Question]) -> Result<(), DocStoreError> {
        let blog_url = match questions.first() {
            Some(q) => &q.blog_url,
            None => return Ok(()),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM processed_questions WHERE blog_url = $1")
            .bind(blog_url)
            .execute(&mut *tx)
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;

        for q in questions {
            let embedding = q.embedding.as_ref().map(|v| Vector::from(v.clone()));
            sqlx::query(
                r#"
                INSERT INTO processed_questions (id, blog_url, blog_id, question, answer,
                                                 icon, embedding, click_count, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(q.id.0)
            .bind(&q.blog_url)
            .bind(q.blog_id.0)
            .bind(&q.question)
            .bind(&q.answer)
            .bind(&q.icon)
            .bind(embedding)
            .bind(q.click_count)
            .bind(q.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DocStoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Stored questions for a URL, in insertion order or shuffled.
    pub async fn questions_by_url(
        &self,
        blog_url: &str,
        randomize: bool,
    ) -> Result<Vec<Question>, DocStoreError> {
        let order = if randomize { "random()" } else { "created_at, id" };

        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            SELECT id, blog_url, blog_id, question, answer, icon, embedding,
                   click_count, created_at
            FROM processed_questions
            WHERE blog_url = $1
            ORDER BY {}
            "#,
            order
        ))
        .bind(blog_url)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Retrieve a single question, embedding included.
    pub async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, DocStoreError> {
        let row = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, blog_url, blog_id, question, answer, icon, embedding,
                   click_count, created_at
            FROM processed_questions
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Atomically bump a question's click counter.
    pub async fn increment_click_count(&self, id: QuestionId) -> Result<(), DocStoreError> {
        sqlx::query(
            "UPDATE processed_questions SET click_count = click_count + 1 WHERE id = $1",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| DocStoreError::Query(e.to_string()))?;
        Ok(())
    }
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: Uuid,
    blog_url: String,
    blog_id: Uuid,
    question: String,
    answer: String,
    icon: String,
    embedding: Option<Vector>,
    click_count: i32,
    created_at: DateTime<Utc>,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Self {
            id: QuestionId::from_uuid(row.id),
            blog_url: row.blog_url,
            blog_id: BlogId::from_uuid(row.blog_id),
            question: row.question,
            answer: row.answer,
            icon: row.icon,
            embedding: row.embedding.map(|v| v.to_vec()),
            click_count: row.click_count,
            created_at: row.created_at,
        }
    }
}
