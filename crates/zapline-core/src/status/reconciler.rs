//! Delivery status reconciler
//!
//! Applies asynchronous delivery/read callbacks to message records. The
//! update rule makes the whole path idempotent under at-least-once,
//! out-of-order webhook delivery: a status is applied only if strictly
//! later in queued < sent < delivered < read, and `failed` is a terminal
//! override. Unknown provider ids are logged and dropped - webhooks cannot
//! be meaningfully rejected back at the provider.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use zapline_storage::db::DatabasePool;
use zapline_storage::models::MessageStatus;
use zapline_storage::repository::{
    CampaignRecipientRepository, CampaignRepository, MessageRepository,
};

/// A parsed provider callback
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub provider_message_id: String,
    pub status: MessageStatus,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// What applying a callback did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The message moved to the reported status
    Applied,
    /// The reported status was not later than the recorded one
    Stale,
    /// No message carries this provider id
    Unknown,
}

/// Delivery status reconciler
#[derive(Clone)]
pub struct StatusReconciler {
    messages: MessageRepository,
    recipients: CampaignRecipientRepository,
    campaigns: CampaignRepository,
}

impl StatusReconciler {
    /// Create a new status reconciler
    pub fn new(db_pool: DatabasePool) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            messages: MessageRepository::new(pool.clone()),
            recipients: CampaignRecipientRepository::new(pool.clone()),
            campaigns: CampaignRepository::new(pool),
        }
    }

    /// Apply one callback. Never errors on stale or unknown updates; only
    /// storage failures propagate.
    pub async fn apply(&self, update: StatusUpdate) -> Result<ReconcileOutcome, sqlx::Error> {
        let Some(message) = self
            .messages
            .get_by_provider_id(&update.provider_message_id)
            .await?
        else {
            warn!(
                provider_message_id = %update.provider_message_id,
                "Status callback for unknown message dropped"
            );
            return Ok(ReconcileOutcome::Unknown);
        };

        let at = update.timestamp.unwrap_or_else(Utc::now);

        let applied = match update.status {
            MessageStatus::Failed => {
                self.messages
                    .mark_failed(message.id, update.error.as_deref())
                    .await?
            }
            status => self.messages.advance_status(message.id, status, at).await?,
        };

        match update.status {
            // delivery implies the campaign recipient moved past sent; the
            // guarded settle makes the counter bump exactly-once even when
            // the provider jumps straight to read or redelivers callbacks
            MessageStatus::Delivered | MessageStatus::Read => {
                if let Some(recipient) = self.recipients.get_by_message(message.id).await? {
                    if self.recipients.mark_delivered(recipient.id).await? {
                        self.campaigns
                            .increment_delivered(recipient.campaign_id)
                            .await?;
                    }
                }
            }
            // a late provider failure is recorded on the recipient but the
            // dispatch counters stay monotonic
            MessageStatus::Failed => {
                if let Some(recipient) = self.recipients.get_by_message(message.id).await? {
                    let reason = update.error.as_deref().unwrap_or("provider reported failure");
                    self.recipients.record_error(recipient.id, reason).await?;
                }
            }
            _ => {}
        }

        if applied {
            debug!(
                message_id = %message.id,
                status = %update.status,
                "Delivery status applied"
            );
            Ok(ReconcileOutcome::Applied)
        } else {
            debug!(
                message_id = %message.id,
                status = %update.status,
                recorded = %message.status,
                "Out-of-order status callback ignored"
            );
            Ok(ReconcileOutcome::Stale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_update_deserializes_provider_shape() {
        let update: StatusUpdate = serde_json::from_str(
            r#"{
                "provider_message_id": "wamid.HBgL",
                "status": "delivered",
                "timestamp": "2026-08-06T10:15:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(update.provider_message_id, "wamid.HBgL");
        assert_eq!(update.status, MessageStatus::Delivered);
        assert!(update.timestamp.is_some());
        assert_eq!(update.error, None);
    }

    #[test]
    fn test_out_of_order_callbacks_converge_on_highest_status() {
        // the admits() relation the SQL guard mirrors: replay callbacks in
        // any order and the recorded status ends at the highest seen,
        // or failed once a failed callback arrives
        use MessageStatus::*;

        let arrivals = [Read, Sent, Delivered, Sent];
        let mut recorded = Queued;
        for status in arrivals {
            if recorded.admits(status) {
                recorded = status;
            }
        }
        assert_eq!(recorded, Read);

        let arrivals = [Delivered, Failed, Read];
        let mut recorded = Sent;
        for status in arrivals {
            if recorded.admits(status) {
                recorded = status;
            }
        }
        assert_eq!(recorded, Failed);
    }
}
