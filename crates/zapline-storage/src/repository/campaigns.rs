//! Campaign repository

use sqlx::PgPool;
use uuid::Uuid;
use zapline_common::types::{CampaignId, OrgId, SequenceId};

use crate::models::{Campaign, CampaignStatus, CreateCampaign, UpdateCampaign};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new campaign
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(&input.payload).unwrap_or_default();
        let metadata = input.metadata.unwrap_or_else(|| serde_json::json!({}));
        let status = if input.scheduled_at.is_some() && input.drip_sequence_id.is_none() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, org_id, channel_id, name, payload, rate_per_sec, status,
                scheduled_at, drip_sequence_id, step_order, delay_minutes, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.org_id)
        .bind(input.channel_id)
        .bind(&input.name)
        .bind(&payload)
        .bind(input.rate_per_sec.unwrap_or(5).clamp(1, 10))
        .bind(status.to_string())
        .bind(input.scheduled_at)
        .bind(input.drip_sequence_id)
        .bind(input.step_order)
        .bind(input.delay_minutes)
        .bind(&metadata)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a campaign by ID and organization
    pub async fn get_by_org(
        &self,
        org_id: OrgId,
        id: CampaignId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Lightweight status read for the dispatch loop's lifecycle checks
    pub async fn get_status(
        &self,
        id: CampaignId,
    ) -> Result<Option<CampaignStatus>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM campaigns WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(status,)| status.parse().ok()))
    }

    /// List campaigns for an organization (drip steps excluded)
    pub async fn list_by_org(
        &self,
        org_id: OrgId,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE org_id = $1 AND status = $2 AND drip_sequence_id IS NULL
                ORDER BY created_at DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(org_id)
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE org_id = $1 AND drip_sequence_id IS NULL
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

    /// Update a draft campaign
    pub async fn update(
        &self,
        org_id: OrgId,
        id: CampaignId,
        input: UpdateCampaign,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let payload = input
            .payload
            .map(|p| serde_json::to_value(&p).unwrap_or_default());

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                name = COALESCE($3, name),
                payload = COALESCE($4, payload),
                rate_per_sec = COALESCE($5, rate_per_sec),
                scheduled_at = COALESCE($6, scheduled_at),
                metadata = COALESCE($7, metadata),
                updated_at = NOW()
            WHERE id = $1 AND org_id = $2 AND status = 'draft'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(&input.name)
        .bind(&payload)
        .bind(input.rate_per_sec.map(|r| r.clamp(1, 10)))
        .bind(input.scheduled_at)
        .bind(&input.metadata)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a campaign. Refused while the campaign is running.
    pub async fn delete(&self, org_id: OrgId, id: CampaignId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM campaigns WHERE id = $1 AND org_id = $2 AND status <> 'running'",
        )
        .bind(id)
        .bind(org_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a campaign to running. Succeeds only from draft,
    /// scheduled, or paused; returns None otherwise (including when the
    /// campaign is already running).
    pub async fn mark_running(
        &self,
        org_id: OrgId,
        id: CampaignId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'running',
                started_at = COALESCE(started_at, NOW()),
                updated_at = NOW()
            WHERE id = $1 AND org_id = $2 AND status IN ('draft', 'scheduled', 'paused')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Pause a running campaign
    pub async fn mark_paused(
        &self,
        org_id: OrgId,
        id: CampaignId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'paused',
                updated_at = NOW()
            WHERE id = $1 AND org_id = $2 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Cancel a campaign from any non-terminal post-draft state
    pub async fn mark_cancelled(
        &self,
        org_id: OrgId,
        id: CampaignId,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'cancelled',
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND org_id = $2 AND status IN ('scheduled', 'running', 'paused')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Complete a running campaign. Conditional so that a pause racing
    /// completion cannot be overwritten.
    pub async fn mark_completed(&self, id: CampaignId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'completed',
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set total recipients count
    pub async fn set_total_recipients(
        &self,
        id: CampaignId,
        total: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE campaigns SET total_recipients = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(total)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically bump the sent counter
    pub async fn increment_sent(&self, id: CampaignId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE campaigns SET sent_count = sent_count + 1, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically bump the failed counter
    pub async fn increment_failed(&self, id: CampaignId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE campaigns SET failed_count = failed_count + 1, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically bump the delivered counter
    pub async fn increment_delivered(&self, id: CampaignId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE campaigns SET delivered_count = delivered_count + 1, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get scheduled campaigns whose start time has passed
    pub async fn get_scheduled_ready(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'scheduled'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Get running campaigns that still have unsettled recipients.
    /// Used by the runner to re-enter dispatch after a process restart.
    pub async fn get_running_with_unsettled(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT c.* FROM campaigns c
            WHERE c.status = 'running'
              AND EXISTS (
                  SELECT 1 FROM campaign_recipients r
                  WHERE r.campaign_id = c.id AND r.status IN ('pending', 'sending')
              )
            ORDER BY c.started_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Get one step campaign of a drip sequence by its order
    pub async fn get_drip_step(
        &self,
        sequence_id: SequenceId,
        step_order: i32,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE drip_sequence_id = $1 AND step_order = $2",
        )
        .bind(sequence_id)
        .bind(step_order)
        .fetch_optional(&self.pool)
        .await
    }

    /// List the step campaigns of a drip sequence in order
    pub async fn list_drip_steps(
        &self,
        sequence_id: SequenceId,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE drip_sequence_id = $1 ORDER BY step_order ASC",
        )
        .bind(sequence_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Count campaigns by organization
    pub async fn count_by_org(
        &self,
        org_id: OrgId,
        status: Option<CampaignStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as(
                "SELECT COUNT(*) FROM campaigns WHERE org_id = $1 AND status = $2 AND drip_sequence_id IS NULL",
            )
            .bind(org_id)
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT COUNT(*) FROM campaigns WHERE org_id = $1 AND drip_sequence_id IS NULL",
            )
            .bind(org_id)
            .fetch_one(&self.pool)
            .await?
        };
        Ok(count.0)
    }
}
