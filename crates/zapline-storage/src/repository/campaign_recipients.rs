//! Campaign recipient repository
//!
//! The claim operation is the concurrency-critical path: a recipient is
//! eligible only while `pending`, and claiming flips it to `sending` in the
//! same statement, so two dispatch loops can never pick up the same row.

use sqlx::{PgPool, Row};
use uuid::Uuid;
use zapline_common::types::{CampaignId, ContactId, MessageId, OrgId, RecipientId};

use crate::models::{CampaignRecipient, RecipientStatus, RecipientStatusCounts};

/// Campaign recipient repository
#[derive(Clone)]
pub struct CampaignRecipientRepository {
    pool: PgPool,
}

impl CampaignRecipientRepository {
    /// Create a new campaign recipient repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach contacts to a draft campaign.
    ///
    /// Only opted-in contacts of the owning organization are inserted;
    /// duplicates are no-ops. Returns the number of rows actually added.
    pub async fn add_contacts(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
        max_attempts: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO campaign_recipients (id, campaign_id, org_id, contact_id, max_attempts)
            SELECT gen_random_uuid(), $1, c.org_id, c.id, $4
            FROM contacts c
            WHERE c.id = ANY($3)
              AND c.org_id = $2
              AND c.is_opted_in
            ON CONFLICT (campaign_id, contact_id) DO NOTHING
            "#,
        )
        .bind(campaign_id)
        .bind(org_id)
        .bind(contact_ids)
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Remove contacts from a campaign while recipients are still pending
    pub async fn remove_contacts(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM campaign_recipients
            WHERE campaign_id = $1 AND org_id = $2 AND contact_id = ANY($3) AND status = 'pending'
            "#,
        )
        .bind(campaign_id)
        .bind(org_id)
        .bind(contact_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// List recipients of a campaign
    pub async fn list_by_campaign(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
        status: Option<RecipientStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CampaignRecipient>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, CampaignRecipient>(
                r#"
                SELECT * FROM campaign_recipients
                WHERE campaign_id = $1 AND org_id = $2 AND status = $3
                ORDER BY created_at ASC
                LIMIT $4 OFFSET $5
                "#,
            )
            .bind(campaign_id)
            .bind(org_id)
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, CampaignRecipient>(
                r#"
                SELECT * FROM campaign_recipients
                WHERE campaign_id = $1 AND org_id = $2
                ORDER BY created_at ASC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(campaign_id)
            .bind(org_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Atomically claim the next batch of pending recipients.
    ///
    /// Rows move `pending -> sending` with the attempt counter bumped in the
    /// same statement. `FOR UPDATE SKIP LOCKED` keeps concurrent claimers
    /// from blocking on or double-claiming the same rows.
    pub async fn claim_pending(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<CampaignRecipient>, sqlx::Error> {
        sqlx::query_as::<_, CampaignRecipient>(
            r#"
            UPDATE campaign_recipients SET
                status = 'sending',
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM campaign_recipients
                WHERE campaign_id = $1 AND status = 'pending'
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Settle a claimed recipient as sent
    pub async fn mark_sent(
        &self,
        id: RecipientId,
        message_id: MessageId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                status = 'sent',
                message_id = $2,
                sent_at = NOW(),
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Settle a claimed recipient as permanently failed
    pub async fn mark_failed(&self, id: RecipientId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                status = 'failed',
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Release a claimed recipient after a transient failure.
    ///
    /// The row returns to `pending` for a later pass until the attempt
    /// budget is spent, at which point it converts to `failed`. Returns the
    /// resulting status.
    pub async fn release_after_transient(
        &self,
        id: RecipientId,
        error: &str,
    ) -> Result<Option<RecipientStatus>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                status = CASE
                    WHEN attempts >= max_attempts THEN 'failed'
                    ELSE 'pending'
                END,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| r.get::<String, _>("status").parse().ok()))
    }

    /// Return a claimed recipient to pending without charging an attempt.
    /// Used when a pause or cancel is observed before its send started.
    pub async fn unclaim(&self, id: RecipientId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                status = 'pending',
                attempts = GREATEST(attempts - 1, 0),
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a sent recipient as delivered (from a delivery callback).
    /// Returns false if the recipient was not in `sent`, which makes the
    /// caller's counter bump exactly-once under webhook redelivery.
    pub async fn mark_delivered(&self, id: RecipientId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                status = 'delivered',
                updated_at = NOW()
            WHERE id = $1 AND status = 'sent'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a post-dispatch provider error without changing status
    pub async fn record_error(&self, id: RecipientId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE campaign_recipients SET last_error = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Find the recipient row backing a message
    pub async fn get_by_message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<CampaignRecipient>, sqlx::Error> {
        sqlx::query_as::<_, CampaignRecipient>(
            "SELECT * FROM campaign_recipients WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Release recipients stuck in `sending` (e.g. after a crash) back to
    /// `pending` so a resumed run can settle them.
    pub async fn release_stale_sending(
        &self,
        older_than_minutes: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients SET
                status = CASE
                    WHEN attempts >= max_attempts THEN 'failed'
                    ELSE 'pending'
                END,
                last_error = COALESCE(last_error, 'send interrupted'),
                updated_at = NOW()
            WHERE status = 'sending'
              AND updated_at < NOW() - make_interval(mins => $1)
            "#,
        )
        .bind(older_than_minutes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Count recipients of a campaign
    pub async fn count_by_campaign(&self, campaign_id: CampaignId) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// Get per-status counts for a campaign
    pub async fn status_counts(
        &self,
        campaign_id: CampaignId,
    ) -> Result<RecipientStatusCounts, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'sending') as sending,
                COUNT(*) FILTER (WHERE status = 'sent') as sent,
                COUNT(*) FILTER (WHERE status = 'delivered') as delivered,
                COUNT(*) FILTER (WHERE status = 'failed') as failed
            FROM campaign_recipients
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RecipientStatusCounts {
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0),
            sending: row.get::<Option<i64>, _>("sending").unwrap_or(0),
            sent: row.get::<Option<i64>, _>("sent").unwrap_or(0),
            delivered: row.get::<Option<i64>, _>("delivered").unwrap_or(0),
            failed: row.get::<Option<i64>, _>("failed").unwrap_or(0),
        })
    }
}
