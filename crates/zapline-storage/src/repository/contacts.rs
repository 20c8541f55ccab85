//! Contact repository

use sqlx::PgPool;
use uuid::Uuid;
use zapline_common::types::{ContactId, OrgId};

use crate::models::{Contact, CreateContact};

/// Contact repository
#[derive(Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    /// Create a new contact repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new contact
    pub async fn create(&self, input: CreateContact) -> Result<Contact, sqlx::Error> {
        let id = Uuid::new_v4();
        let attributes = input.attributes.unwrap_or_else(|| serde_json::json!({}));

        sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (id, org_id, phone, name, is_opted_in, attributes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.org_id)
        .bind(&input.phone)
        .bind(&input.name)
        .bind(input.is_opted_in.unwrap_or(true))
        .bind(&attributes)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a contact by ID and organization
    pub async fn get_by_org(
        &self,
        org_id: OrgId,
        id: ContactId,
    ) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List contacts for an organization
    pub async fn list_by_org(
        &self,
        org_id: OrgId,
        opted_in_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, sqlx::Error> {
        if opted_in_only {
            sqlx::query_as::<_, Contact>(
                r#"
                SELECT * FROM contacts
                WHERE org_id = $1 AND is_opted_in
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(org_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Contact>(
                r#"
                SELECT * FROM contacts
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
    }

    /// Set the opt-in flag for a contact
    pub async fn set_opted_in(
        &self,
        org_id: OrgId,
        id: ContactId,
        opted_in: bool,
    ) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            UPDATE contacts SET
                is_opted_in = $3,
                updated_at = NOW()
            WHERE id = $1 AND org_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(opted_in)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a contact
    pub async fn delete(&self, org_id: OrgId, id: ContactId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
