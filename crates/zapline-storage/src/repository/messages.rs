//! Message repository
//!
//! Status updates go through a rank guard so that out-of-order delivery
//! callbacks can only ever move a message forward in
//! queued < sent < delivered < read, with `failed` as a terminal override.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use zapline_common::types::{ConversationId, MessageId, OrgId};

use crate::models::{CreateMessage, Message, MessageStatus};

/// SQL expression mapping a status column/parameter to its precedence rank.
/// `failed` maps below everything so it can never be superseded.
const STATUS_RANK: &str = "CASE {} \
    WHEN 'queued' THEN 0 \
    WHEN 'sent' THEN 1 \
    WHEN 'delivered' THEN 2 \
    WHEN 'read' THEN 3 \
    ELSE -1 END";

fn rank_expr(term: &str) -> String {
    STATUS_RANK.replace("{}", term)
}

/// Message repository
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new message repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new outbound message record
    pub async fn create(&self, input: CreateMessage) -> Result<Message, sqlx::Error> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(&input.payload).unwrap_or_default();
        let sent_at = matches!(input.status, MessageStatus::Sent).then(Utc::now);

        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, org_id, conversation_id, campaign_id, contact_id, channel_id,
                direction, payload, provider_message_id, status, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'outbound', $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.org_id)
        .bind(input.conversation_id)
        .bind(input.campaign_id)
        .bind(input.contact_id)
        .bind(input.channel_id)
        .bind(&payload)
        .bind(&input.provider_message_id)
        .bind(input.status.to_string())
        .bind(sent_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a message by ID and organization
    pub async fn get_by_org(
        &self,
        org_id: OrgId,
        id: MessageId,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Look up a message by the provider-assigned identifier
    pub async fn get_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE provider_message_id = $1")
            .bind(provider_message_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List messages of a conversation, newest first
    pub async fn list_by_conversation(
        &self,
        org_id: OrgId,
        conversation_id: ConversationId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1 AND org_id = $2
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(conversation_id)
        .bind(org_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Advance a message to a strictly later status.
    ///
    /// Returns false when the recorded status is already the same or later
    /// (or failed), which makes webhook redelivery and reordering harmless.
    pub async fn advance_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        debug_assert!(status.rank().is_some(), "failed goes through mark_failed");

        let sql = format!(
            r#"
            UPDATE messages SET
                status = $2,
                sent_at = CASE WHEN $2 = 'sent' THEN COALESCE(sent_at, $3) ELSE sent_at END,
                delivered_at = CASE WHEN $2 = 'delivered' THEN COALESCE(delivered_at, $3) ELSE delivered_at END,
                read_at = CASE WHEN $2 = 'read' THEN COALESCE(read_at, $3) ELSE read_at END,
                updated_at = NOW()
            WHERE id = $1
              AND status <> 'failed'
              AND {current} < {candidate}
            "#,
            current = rank_expr("status"),
            candidate = rank_expr("$2"),
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(status.to_string())
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a message failed: a terminal override applied from any
    /// non-failed state.
    pub async fn mark_failed(
        &self,
        id: MessageId,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET
                status = 'failed',
                error = COALESCE($2, error),
                updated_at = NOW()
            WHERE id = $1 AND status <> 'failed'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
