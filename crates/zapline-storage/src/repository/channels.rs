//! Channel repository

use sqlx::PgPool;
use uuid::Uuid;
use zapline_common::types::{ChannelId, OrgId};

use crate::models::{Channel, CreateChannel};

/// Channel repository
#[derive(Clone)]
pub struct ChannelRepository {
    pool: PgPool,
}

impl ChannelRepository {
    /// Create a new channel repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new channel
    pub async fn create(&self, input: CreateChannel) -> Result<Channel, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (id, org_id, name, provider, phone_number, credentials, max_rate_per_sec)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.org_id)
        .bind(&input.name)
        .bind(input.provider.to_string())
        .bind(&input.phone_number)
        .bind(&input.credentials)
        .bind(input.max_rate_per_sec.unwrap_or(10).max(1))
        .fetch_one(&self.pool)
        .await
    }

    /// Get a channel by ID and organization
    pub async fn get_by_org(
        &self,
        org_id: OrgId,
        id: ChannelId,
    ) -> Result<Option<Channel>, sqlx::Error> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List channels for an organization
    pub async fn list_by_org(&self, org_id: OrgId) -> Result<Vec<Channel>, sqlx::Error> {
        sqlx::query_as::<_, Channel>(
            "SELECT * FROM channels WHERE org_id = $1 ORDER BY created_at ASC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete a channel
    pub async fn delete(&self, org_id: OrgId, id: ChannelId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
