//! Recipient cursor - durable claim/settle pointer over a campaign's
//! recipient set.
//!
//! Claiming flips rows `pending -> sending` in a single conditional
//! statement, so a recipient can only ever be in flight in one dispatch
//! loop at a time, across processes. Settling moves the row to `sent` or
//! `failed`, or releases it back to `pending` for a later pass after a
//! transient failure (bounded by the per-recipient attempt budget). This is
//! what makes `execute` safely re-invocable: already-attempted recipients
//! are simply not claimable again.

use zapline_common::types::{CampaignId, MessageId, RecipientId};
use zapline_storage::models::{CampaignRecipient, RecipientStatus};
use zapline_storage::repository::CampaignRecipientRepository;

/// Claim/settle cursor over a campaign's pending recipients
#[derive(Clone)]
pub struct RecipientCursor {
    recipients: CampaignRecipientRepository,
    batch_size: i64,
}

impl RecipientCursor {
    pub fn new(recipients: CampaignRecipientRepository, batch_size: i64) -> Self {
        Self {
            recipients,
            batch_size: batch_size.max(1),
        }
    }

    /// Claim the next batch of pending recipients for exclusive dispatch
    pub async fn claim_batch(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<CampaignRecipient>, sqlx::Error> {
        self.recipients
            .claim_pending(campaign_id, self.batch_size)
            .await
    }

    /// Settle a claimed recipient as sent, linking its message record
    pub async fn settle_sent(
        &self,
        id: RecipientId,
        message_id: MessageId,
    ) -> Result<bool, sqlx::Error> {
        self.recipients.mark_sent(id, message_id).await
    }

    /// Settle a claimed recipient as permanently failed
    pub async fn settle_failed(&self, id: RecipientId, error: &str) -> Result<bool, sqlx::Error> {
        self.recipients.mark_failed(id, error).await
    }

    /// Hand a claimed recipient back untouched (no attempt charged); used
    /// when the lifecycle flag flips before its send started
    pub async fn unclaim(&self, id: RecipientId) -> Result<bool, sqlx::Error> {
        self.recipients.unclaim(id).await
    }

    /// Release a claimed recipient after a transient failure; returns the
    /// status the row ended in (`pending` again, or `failed` once the
    /// attempt budget is exhausted)
    pub async fn release_transient(
        &self,
        id: RecipientId,
        error: &str,
    ) -> Result<Option<RecipientStatus>, sqlx::Error> {
        self.recipients.release_after_transient(id, error).await
    }

    /// Number of recipients not yet settled (pending or in flight)
    pub async fn unsettled(&self, campaign_id: CampaignId) -> Result<i64, sqlx::Error> {
        Ok(self.recipients.status_counts(campaign_id).await?.unsettled())
    }
}
