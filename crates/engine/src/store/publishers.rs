use chrono::Utc;
use uuid::Uuid;

use askpage_common::config::PublisherConfig;
use askpage_common::ids::PublisherId;
use askpage_common::types::{parse_publisher_status, Publisher};
use askpage_common::url::parent_domains;

use super::{PublisherStore, StoreError};

impl PublisherStore {
    /// Insert a new publisher record.
    pub async fn create_publisher(&self, publisher: &Publisher) -> Result<(), StoreError> {
        let config_json = serde_json::to_value(&publisher.config).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO publishers (id, domain, email, status, api_key_hash, admin_api_key_ref,
                                    subscription_tier, config, widget_config,
                                    total_blogs_processed, blog_slots_reserved,
                                    total_questions_generated, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(publisher.id.0)
        .bind(&publisher.domain)
        .bind(&publisher.email)
        .bind(publisher.status.as_db_str())
        .bind(&publisher.api_key_hash)
        .bind(&publisher.admin_api_key_ref)
        .bind(&publisher.subscription_tier)
        .bind(&config_json)
        .bind(&publisher.widget_config)
        .bind(publisher.total_blogs_processed)
        .bind(publisher.blog_slots_reserved)
        .bind(publisher.total_questions_generated)
        .bind(publisher.created_at)
        .bind(publisher.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(format!("publisher already registered: {}", db))
            }
            other => StoreError::Query(other.to_string()),
        })?;

        Ok(())
    }

    /// Retrieve a publisher by ID.
    pub async fn get_by_id(&self, id: PublisherId) -> Result<Publisher, StoreError> {
        let row = sqlx::query_as::<_, PublisherRow>(&select_publishers("WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(format!("Publisher {}", id)))?;

        Ok(row.into())
    }

    /// Look up a publisher by canonical domain. With `allow_subdomain`, the
    /// longest registered suffix of `domain` at a label boundary wins.
    pub async fn get_by_domain(
        &self,
        domain: &str,
        allow_subdomain: bool,
    ) -> Result<Option<Publisher>, StoreError> {
        let row = if allow_subdomain {
            let candidates = parent_domains(domain);
            sqlx::query_as::<_, PublisherRow>(&select_publishers(
                "WHERE domain = ANY($1) ORDER BY length(domain) DESC LIMIT 1",
            ))
            .bind(&candidates)
            .fetch_optional(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, PublisherRow>(&select_publishers("WHERE domain = $1"))
                .bind(domain)
                .fetch_optional(&self.pool)
                .await
        }
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Look up a publisher by the SHA-256 digest of its API key. Keys are
    /// hashed before comparison, so the lookup never touches key material.
    pub async fn get_by_api_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<Publisher>, StoreError> {
        let row = sqlx::query_as::<_, PublisherRow>(&select_publishers("WHERE api_key_hash = $1"))
            .bind(api_key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Reserve one blog slot against the publisher's lifetime quota.
    ///
    /// Runs as a single transaction with a row lock: check
    /// `total_blogs_processed + blog_slots_reserved < max_total_blogs`,
    /// then increment the reservation.
    pub async fn reserve_blog_slot(&self, id: PublisherId) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let row: Option<(i32, i32, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT total_blogs_processed, blog_slots_reserved, config
            FROM publishers
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let (processed, reserved, config_json) =
            row.ok_or_else(|| StoreError::NotFound(format!("Publisher {}", id)))?;

        let config: PublisherConfig = serde_json::from_value(config_json).unwrap_or_default();

        if let Some(max_total) = config.max_total_blogs {
            if processed as i64 + reserved as i64 >= max_total as i64 {
                return Err(StoreError::QuotaExceeded(format!(
                    "publisher {} has used {}/{} blog slots",
                    id,
                    processed as i64 + reserved as i64,
                    max_total
                )));
            }
        }

        sqlx::query(
            r#"
            UPDATE publishers
            SET blog_slots_reserved = blog_slots_reserved + 1, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Release a reserved slot. With `processed`, the slot converts into a
    /// processed blog. The reservation counter never goes below zero.
    pub async fn release_blog_slot(
        &self,
        id: PublisherId,
        processed: bool,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT blog_slots_reserved FROM publishers WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let (reserved,) = row.ok_or_else(|| StoreError::NotFound(format!("Publisher {}", id)))?;

        let decrement = if reserved > 0 {
            1
        } else {
            tracing::warn!(
                publisher_id = %id,
                "Releasing a blog slot with none reserved, clamping at 0"
            );
            0
        };
        let processed_increment = if processed { 1 } else { 0 };

        sqlx::query(
            r#"
            UPDATE publishers
            SET blog_slots_reserved = blog_slots_reserved - $2,
                total_blogs_processed = total_blogs_processed + $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(decrement)
        .bind(processed_increment)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Add `n` to the publisher's lifetime question counter.
    pub async fn increment_questions_generated(
        &self,
        id: PublisherId,
        n: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE publishers
            SET total_questions_generated = total_questions_generated + $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(n)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    /// Record activity on an authenticated request.
    pub async fn touch_last_active(&self, id: PublisherId) -> Result<(), StoreError> {
        sqlx::query("UPDATE publishers SET last_active_at = now() WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

fn select_publishers(suffix: &str) -> String {
    format!(
        r#"
        SELECT id, domain, email, status, api_key_hash, admin_api_key_ref,
               subscription_tier, config, widget_config,
               total_blogs_processed, blog_slots_reserved, total_questions_generated,
               created_at, updated_at, last_active_at
        FROM publishers
        {}
        "#,
        suffix
    )
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct PublisherRow {
    id: Uuid,
    domain: String,
    email: String,
    status: String,
    api_key_hash: String,
    admin_api_key_ref: Option<String>,
    subscription_tier: String,
    config: serde_json::Value,
    widget_config: serde_json::Value,
    total_blogs_processed: i32,
    blog_slots_reserved: i32,
    total_questions_generated: i64,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    last_active_at: Option<chrono::DateTime<Utc>>,
}

impl From<PublisherRow> for Publisher {
    fn from(row: PublisherRow) -> Self {
        let config: PublisherConfig = serde_json::from_value(row.config).unwrap_or_default();

        Self {
            id: PublisherId::from_uuid(row.id),
            domain: row.domain,
            email: row.email,
            status: parse_publisher_status(&row.status),
            api_key_hash: row.api_key_hash,
            admin_api_key_ref: row.admin_api_key_ref,
            subscription_tier: row.subscription_tier,
            config,
            widget_config: row.widget_config,
            total_blogs_processed: row.total_blogs_processed,
            blog_slots_reserved: row.blog_slots_reserved,
            total_questions_generated: row.total_questions_generated,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_active_at: row.last_active_at,
        }
    }
}
