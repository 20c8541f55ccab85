//! Drip enrollment repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use zapline_common::types::{ContactId, EnrollmentId, OrgId, SequenceId};

use crate::models::DripEnrollment;

/// Drip enrollment repository
#[derive(Clone)]
pub struct DripEnrollmentRepository {
    pool: PgPool,
}

impl DripEnrollmentRepository {
    /// Create a new drip enrollment repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enroll a contact into a sequence.
    ///
    /// If an active enrollment already exists for the (sequence, contact)
    /// pair it is reset to the beginning instead of duplicated.
    pub async fn enroll(
        &self,
        org_id: OrgId,
        sequence_id: SequenceId,
        contact_id: ContactId,
        first_due: DateTime<Utc>,
    ) -> Result<DripEnrollment, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, DripEnrollment>(
            r#"
            INSERT INTO drip_enrollments (id, org_id, sequence_id, contact_id, current_step, next_message_at, status)
            VALUES ($1, $2, $3, $4, 0, $5, 'active')
            ON CONFLICT (sequence_id, contact_id) WHERE status = 'active'
            DO UPDATE SET
                current_step = 0,
                next_message_at = EXCLUDED.next_message_at,
                last_error = NULL,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(sequence_id)
        .bind(contact_id)
        .bind(first_due)
        .fetch_one(&self.pool)
        .await
    }

    /// Get an enrollment by ID and organization
    pub async fn get_by_org(
        &self,
        org_id: OrgId,
        id: EnrollmentId,
    ) -> Result<Option<DripEnrollment>, sqlx::Error> {
        sqlx::query_as::<_, DripEnrollment>(
            "SELECT * FROM drip_enrollments WHERE id = $1 AND org_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List enrollments of a sequence
    pub async fn list_by_sequence(
        &self,
        org_id: OrgId,
        sequence_id: SequenceId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DripEnrollment>, sqlx::Error> {
        sqlx::query_as::<_, DripEnrollment>(
            r#"
            SELECT * FROM drip_enrollments
            WHERE sequence_id = $1 AND org_id = $2
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(sequence_id)
        .bind(org_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// List due active enrollments of active sequences
    pub async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DripEnrollment>, sqlx::Error> {
        sqlx::query_as::<_, DripEnrollment>(
            r#"
            SELECT e.* FROM drip_enrollments e
            JOIN drip_sequences s ON s.id = e.sequence_id
            WHERE e.status = 'active'
              AND e.next_message_at IS NOT NULL
              AND e.next_message_at <= $1
              AND s.is_active
            ORDER BY e.next_message_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Advance an enrollment's step and next due time in one update.
    ///
    /// Guarded on the step the caller observed, so a concurrent sweep that
    /// already advanced the row turns this into a no-op.
    pub async fn advance(
        &self,
        id: EnrollmentId,
        from_step: i32,
        to_step: i32,
        next_message_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE drip_enrollments SET
                current_step = $3,
                next_message_at = $4,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active' AND current_step = $2
            "#,
        )
        .bind(id)
        .bind(from_step)
        .bind(to_step)
        .bind(next_message_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark an enrollment completed, clearing the due time
    pub async fn complete(&self, id: EnrollmentId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE drip_enrollments SET
                status = 'completed',
                next_message_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Cancel an active enrollment, clearing the due time
    pub async fn cancel(
        &self,
        org_id: OrgId,
        id: EnrollmentId,
        reason: Option<&str>,
    ) -> Result<Option<DripEnrollment>, sqlx::Error> {
        sqlx::query_as::<_, DripEnrollment>(
            r#"
            UPDATE drip_enrollments SET
                status = 'cancelled',
                next_message_at = NULL,
                last_error = COALESCE($3, last_error),
                updated_at = NOW()
            WHERE id = $1 AND org_id = $2 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
    }

    /// Record a sweep error on an enrollment without advancing it
    pub async fn record_error(&self, id: EnrollmentId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE drip_enrollments SET last_error = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
