//! API key repository

use sqlx::PgPool;
use uuid::Uuid;
use zapline_common::types::OrgId;

use crate::models::ApiKey;

/// API key repository
#[derive(Clone)]
pub struct ApiKeyRepository {
    pool: PgPool,
}

impl ApiKeyRepository {
    /// Create a new API key repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a new API key (already hashed by the caller)
    pub async fn create(
        &self,
        org_id: OrgId,
        name: &str,
        key_hash: &str,
        key_prefix: &str,
    ) -> Result<ApiKey, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (id, org_id, name, key_hash, key_prefix)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(name)
        .bind(key_hash)
        .bind(key_prefix)
        .fetch_one(&self.pool)
        .await
    }

    /// Find candidate keys by prefix
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT * FROM api_keys
            WHERE key_prefix = $1
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
    }

    /// Stamp last use of a key
    pub async fn touch_last_used(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete an API key
    pub async fn delete(&self, org_id: OrgId, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
