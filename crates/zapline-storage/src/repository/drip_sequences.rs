//! Drip sequence repository

use sqlx::PgPool;
use uuid::Uuid;
use zapline_common::types::{OrgId, SequenceId};

use crate::models::{CreateDripSequence, DripSequence};

/// Drip sequence repository
#[derive(Clone)]
pub struct DripSequenceRepository {
    pool: PgPool,
}

impl DripSequenceRepository {
    /// Create a new drip sequence repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new drip sequence (inactive until explicitly activated)
    pub async fn create(&self, input: CreateDripSequence) -> Result<DripSequence, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, DripSequence>(
            r#"
            INSERT INTO drip_sequences (id, org_id, channel_id, name)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.org_id)
        .bind(input.channel_id)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a sequence by ID and organization
    pub async fn get_by_org(
        &self,
        org_id: OrgId,
        id: SequenceId,
    ) -> Result<Option<DripSequence>, sqlx::Error> {
        sqlx::query_as::<_, DripSequence>(
            "SELECT * FROM drip_sequences WHERE id = $1 AND org_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List sequences for an organization
    pub async fn list_by_org(
        &self,
        org_id: OrgId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DripSequence>, sqlx::Error> {
        sqlx::query_as::<_, DripSequence>(
            r#"
            SELECT * FROM drip_sequences
            WHERE org_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(org_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Activate or deactivate a sequence
    pub async fn set_active(
        &self,
        org_id: OrgId,
        id: SequenceId,
        active: bool,
    ) -> Result<Option<DripSequence>, sqlx::Error> {
        sqlx::query_as::<_, DripSequence>(
            r#"
            UPDATE drip_sequences SET
                is_active = $3,
                updated_at = NOW()
            WHERE id = $1 AND org_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a sequence (steps and enrollments cascade)
    pub async fn delete(&self, org_id: OrgId, id: SequenceId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM drip_sequences WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
