//! Conversation repository

use sqlx::PgPool;
use uuid::Uuid;
use zapline_common::types::{ChannelId, ContactId, ConversationId, OrgId};

use crate::models::Conversation;

/// Conversation repository
#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    /// Create a new conversation repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the open conversation for a (contact, channel) pair, creating
    /// one if none exists. Concurrent callers converge on the same row via
    /// the partial unique index.
    pub async fn find_or_create_open(
        &self,
        org_id: OrgId,
        contact_id: ContactId,
        channel_id: ChannelId,
    ) -> Result<Conversation, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, org_id, contact_id, channel_id, status)
            VALUES ($1, $2, $3, $4, 'open')
            ON CONFLICT (org_id, contact_id, channel_id) WHERE status = 'open'
            DO UPDATE SET updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(contact_id)
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a conversation by ID and organization
    pub async fn get_by_org(
        &self,
        org_id: OrgId,
        id: ConversationId,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1 AND org_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Stamp the conversation's last message time
    pub async fn touch_last_message(&self, id: ConversationId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE conversations SET last_message_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Close a conversation
    pub async fn close(&self, org_id: OrgId, id: ConversationId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE conversations SET
                status = 'closed',
                updated_at = NOW()
            WHERE id = $1 AND org_id = $2 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(org_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
