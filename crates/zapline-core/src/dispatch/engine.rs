//! Campaign execution engine
//!
//! Drives campaign runs: claims recipients through the cursor, paces sends
//! through the rate governor and transport, settles per-recipient outcomes,
//! maintains the aggregate counters, and moves the campaign lifecycle.
//!
//! Per-recipient failures never abort a run; they are recorded as data and
//! the loop continues. Campaign state lives in the database row by row, so
//! a process crash mid-run is recovered by simply re-invoking `execute` -
//! the conditional claim makes re-entry safe, not merely probable.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};
use zapline_common::config::DispatchConfig;
use zapline_common::types::{CampaignId, MessagePayload, OrgId, PhoneNumber};
use zapline_storage::db::DatabasePool;
use zapline_storage::models::{
    Campaign, CampaignRecipient, CampaignStats, CampaignStatus, Channel, CreateMessage,
    MessageStatus, RecipientStatus,
};
use zapline_storage::repository::{
    CampaignRecipientRepository, CampaignRepository, ChannelRepository, ContactRepository,
    ConversationRepository, MessageRepository,
};

use crate::dispatch::{effective_rate, RateGovernor, RecipientCursor};
use crate::transport::{SendError, Transport, TransportResolver};

/// Penalty applied to a channel lane when the provider signals backoff
const BACKOFF_PENALTY: Duration = Duration::from_secs(2);

/// Campaign engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Invalid state transition from '{0}'")]
    InvalidStateTransition(String),

    #[error("Campaign channel misconfigured: {0}")]
    ChannelConfig(String),

    #[error("Drip step campaigns are dispatched by the drip scheduler")]
    DripStep,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Campaign execution engine
#[derive(Clone)]
pub struct CampaignEngine {
    campaigns: CampaignRepository,
    recipients: CampaignRecipientRepository,
    contacts: ContactRepository,
    channels: ChannelRepository,
    conversations: ConversationRepository,
    messages: MessageRepository,
    cursor: RecipientCursor,
    governor: Arc<RateGovernor>,
    transports: TransportResolver,
    config: DispatchConfig,
    /// Campaign runs currently driven by this process
    active: Arc<Mutex<HashSet<CampaignId>>>,
}

impl CampaignEngine {
    /// Create a new campaign engine
    pub fn new(
        db_pool: DatabasePool,
        governor: Arc<RateGovernor>,
        transports: TransportResolver,
        config: DispatchConfig,
    ) -> Self {
        let pool = db_pool.pool().clone();
        let recipients = CampaignRecipientRepository::new(pool.clone());

        Self {
            campaigns: CampaignRepository::new(pool.clone()),
            recipients: recipients.clone(),
            contacts: ContactRepository::new(pool.clone()),
            channels: ChannelRepository::new(pool.clone()),
            conversations: ConversationRepository::new(pool.clone()),
            messages: MessageRepository::new(pool),
            cursor: RecipientCursor::new(recipients, config.batch_size),
            governor,
            transports,
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start (or re-enter) a campaign run.
    ///
    /// Transitions the campaign to running from draft, scheduled, or
    /// paused. Calling it on an already-running campaign does not start a
    /// duplicate: dispatch is re-entered only if this process is not
    /// already driving it, and the claim step keeps concurrent processes
    /// from double-sending either way. Returns a stats snapshot.
    pub async fn execute(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
    ) -> Result<CampaignStats, EngineError> {
        let campaign = self
            .campaigns
            .get_by_org(org_id, campaign_id)
            .await?
            .ok_or(EngineError::NotFound)?;

        if campaign.is_drip_step() {
            return Err(EngineError::DripStep);
        }

        let status = campaign
            .status_enum()
            .ok_or_else(|| EngineError::InvalidStateTransition(campaign.status.clone()))?;

        let campaign = if status.can_start() {
            let total = self.recipients.count_by_campaign(campaign_id).await?;
            self.campaigns
                .set_total_recipients(campaign_id, total as i32)
                .await?;

            match self.campaigns.mark_running(org_id, campaign_id).await? {
                Some(campaign) => campaign,
                // lost a race with a concurrent call; take the fresh state
                None => self
                    .campaigns
                    .get_by_org(org_id, campaign_id)
                    .await?
                    .ok_or(EngineError::NotFound)?,
            }
        } else {
            campaign
        };

        if campaign.status_enum() != Some(CampaignStatus::Running) {
            return Err(EngineError::InvalidStateTransition(campaign.status.clone()));
        }

        self.spawn_dispatch(campaign).await?;
        self.stats(org_id, campaign_id).await
    }

    /// Pause a running campaign. Claimed in-flight sends finish; no new
    /// recipients are claimed once the dispatch loop observes the flag.
    pub async fn pause(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
    ) -> Result<CampaignStats, EngineError> {
        match self.campaigns.mark_paused(org_id, campaign_id).await? {
            Some(campaign) => {
                info!(campaign_id = %campaign.id, "Campaign paused");
                self.stats(org_id, campaign_id).await
            }
            None => Err(self.transition_error(org_id, campaign_id).await?),
        }
    }

    /// Resume a paused campaign from wherever the cursor left off
    pub async fn resume(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
    ) -> Result<CampaignStats, EngineError> {
        self.execute(org_id, campaign_id).await
    }

    /// Cancel a campaign. Remaining pending recipients are left pending so
    /// the run's reach stays inspectable; the engine will not process a
    /// cancelled campaign again.
    pub async fn cancel(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
    ) -> Result<CampaignStats, EngineError> {
        match self.campaigns.mark_cancelled(org_id, campaign_id).await? {
            Some(campaign) => {
                info!(campaign_id = %campaign.id, "Campaign cancelled");
                self.stats(org_id, campaign_id).await
            }
            None => Err(self.transition_error(org_id, campaign_id).await?),
        }
    }

    /// Read-only counters snapshot
    pub async fn stats(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
    ) -> Result<CampaignStats, EngineError> {
        let campaign = self
            .campaigns
            .get_by_org(org_id, campaign_id)
            .await?
            .ok_or(EngineError::NotFound)?;

        let counts = self.recipients.status_counts(campaign_id).await?;

        Ok(CampaignStats {
            campaign_id,
            status: campaign.status.clone(),
            total_recipients: campaign.total_recipients,
            sent: campaign.sent_count,
            delivered: campaign.delivered_count,
            failed: campaign.failed_count,
            pending: counts.unsettled(),
            progress_percentage: campaign.progress_percentage(),
            started_at: campaign.started_at,
            completed_at: campaign.completed_at,
        })
    }

    /// Whether this process is currently driving the campaign's dispatch
    pub async fn is_active(&self, campaign_id: CampaignId) -> bool {
        self.active.lock().await.contains(&campaign_id)
    }

    /// Distinguish not-found from wrong-state after a conditional
    /// transition matched no row
    async fn transition_error(
        &self,
        org_id: OrgId,
        campaign_id: CampaignId,
    ) -> Result<EngineError, sqlx::Error> {
        Ok(match self.campaigns.get_by_org(org_id, campaign_id).await? {
            Some(campaign) => EngineError::InvalidStateTransition(campaign.status),
            None => EngineError::NotFound,
        })
    }

    /// Resolve channel and transport, then spawn the dispatch loop unless
    /// this process is already driving the campaign.
    async fn spawn_dispatch(&self, campaign: Campaign) -> Result<(), EngineError> {
        {
            let mut active = self.active.lock().await;
            if !active.insert(campaign.id) {
                return Ok(());
            }
        }

        let prepared = self.prepare_dispatch(&campaign).await;
        let (channel, payload, transport) = match prepared {
            Ok(parts) => parts,
            Err(e) => {
                self.active.lock().await.remove(&campaign.id);
                return Err(e);
            }
        };

        let engine = self.clone();
        let campaign_id = campaign.id;
        tokio::spawn(async move {
            engine
                .run_dispatch(campaign, channel, payload, transport)
                .await;
            engine.active.lock().await.remove(&campaign_id);
        });

        Ok(())
    }

    /// Campaign-level configuration checks, surfaced to the caller instead
    /// of silently completing
    async fn prepare_dispatch(
        &self,
        campaign: &Campaign,
    ) -> Result<(Channel, MessagePayload, Arc<dyn Transport>), EngineError> {
        let channel = self
            .channels
            .get_by_org(campaign.org_id, campaign.channel_id)
            .await?
            .ok_or_else(|| EngineError::ChannelConfig("channel not found".to_string()))?;

        let payload = campaign
            .payload()
            .map_err(|e| EngineError::ChannelConfig(format!("unreadable payload: {}", e)))?;

        let transport = self
            .transports
            .resolve(&channel)
            .map_err(|e| EngineError::ChannelConfig(e.to_string()))?;

        Ok((channel, payload, transport))
    }

    /// The dispatch loop: claim a batch, pace each send through the
    /// governor, settle outcomes, repeat until drained or the lifecycle
    /// flag changes.
    async fn run_dispatch(
        &self,
        campaign: Campaign,
        channel: Channel,
        payload: MessagePayload,
        transport: Arc<dyn Transport>,
    ) {
        let rate = effective_rate(campaign.clamped_rate(), channel.max_rate_per_sec);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        info!(
            campaign_id = %campaign.id,
            channel_id = %channel.id,
            rate_per_sec = rate,
            "Campaign dispatch started"
        );

        loop {
            // lifecycle flag is observed between batches; pause and cancel
            // are cooperative
            let current = match self.campaigns.get_by_org(campaign.org_id, campaign.id).await {
                Ok(Some(c)) => c,
                Ok(None) => {
                    warn!(campaign_id = %campaign.id, "Campaign disappeared mid-run");
                    return;
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Failed to read campaign: {}", e);
                    return;
                }
            };

            if current.status_enum() != Some(CampaignStatus::Running) {
                info!(
                    campaign_id = %campaign.id,
                    status = %current.status,
                    "Campaign dispatch stopping"
                );
                return;
            }

            let batch = match self.cursor.claim_batch(campaign.id).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Recipient claim failed: {}", e);
                    return;
                }
            };

            if batch.is_empty() {
                self.finish_if_drained(&campaign).await;
                return;
            }

            let mut handles = Vec::with_capacity(batch.len());
            let mut batch = batch.into_iter();
            let mut interrupted = false;

            while let Some(recipient) = batch.next() {
                // the lifecycle flag is observed before every send; a
                // claimed recipient whose send has not started yet is
                // handed back rather than dispatched
                match self.campaigns.get_status(campaign.id).await {
                    Ok(Some(CampaignStatus::Running)) => {}
                    Ok(status) => {
                        info!(
                            campaign_id = %campaign.id,
                            status = ?status,
                            "Campaign dispatch interrupted"
                        );
                        self.unclaim_rest(&campaign, recipient, batch).await;
                        interrupted = true;
                        break;
                    }
                    Err(e) => {
                        error!(campaign_id = %campaign.id, "Failed to read status: {}", e);
                        self.unclaim_rest(&campaign, recipient, batch).await;
                        interrupted = true;
                        break;
                    }
                }

                self.governor.acquire(channel.id, rate).await;

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    return;
                };

                let engine = self.clone();
                let campaign = campaign.clone();
                let channel = channel.clone();
                let payload = payload.clone();
                let transport = transport.clone();

                handles.push(tokio::spawn(async move {
                    engine
                        .deliver_one(&campaign, &channel, &payload, transport, recipient)
                        .await;
                    drop(permit);
                }));
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    error!(campaign_id = %campaign.id, "Dispatch task panicked: {}", e);
                }
            }

            if interrupted {
                return;
            }
        }
    }

    /// Return the unsent remainder of a claimed batch to pending
    async fn unclaim_rest(
        &self,
        campaign: &Campaign,
        first: CampaignRecipient,
        rest: impl Iterator<Item = CampaignRecipient>,
    ) {
        for recipient in std::iter::once(first).chain(rest) {
            if let Err(e) = self.cursor.unclaim(recipient.id).await {
                error!(
                    campaign_id = %campaign.id,
                    recipient_id = %recipient.id,
                    "Failed to unclaim recipient: {}",
                    e
                );
            }
        }
    }

    /// Complete the campaign once nothing is pending or in flight
    async fn finish_if_drained(&self, campaign: &Campaign) {
        match self.cursor.unsettled(campaign.id).await {
            Ok(0) => match self.campaigns.mark_completed(campaign.id).await {
                Ok(true) => info!(campaign_id = %campaign.id, "Campaign completed"),
                Ok(false) => {}
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Failed to complete campaign: {}", e)
                }
            },
            Ok(_) => {
                // another worker still owns in-flight claims; it will finish
            }
            Err(e) => error!(campaign_id = %campaign.id, "Failed to count recipients: {}", e),
        }
    }

    /// Attempt delivery to one claimed recipient and settle the outcome.
    /// Contained: every failure path ends in a recorded status, never a
    /// propagated error.
    async fn deliver_one(
        &self,
        campaign: &Campaign,
        channel: &Channel,
        payload: &MessagePayload,
        transport: Arc<dyn Transport>,
        recipient: CampaignRecipient,
    ) {
        let contact = match self
            .contacts
            .get_by_org(recipient.org_id, recipient.contact_id)
            .await
        {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                self.settle_permanent_failure(campaign, &recipient, "contact no longer exists")
                    .await;
                return;
            }
            Err(e) => {
                warn!(recipient_id = %recipient.id, "Contact lookup failed: {}", e);
                self.settle_transient_failure(campaign, channel, &recipient, "storage error")
                    .await;
                return;
            }
        };

        // opt-in is enforced at add time; honor a later opt-out as well
        if !contact.is_opted_in {
            self.settle_permanent_failure(campaign, &recipient, "contact opted out")
                .await;
            return;
        }

        let Some(phone) = PhoneNumber::parse(&contact.phone) else {
            self.settle_permanent_failure(campaign, &recipient, "invalid phone number")
                .await;
            return;
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(self.config.send_timeout_secs),
            transport.send(&phone, payload),
        )
        .await
        .unwrap_or_else(|_| Err(SendError::ProviderUnavailable("send timed out".to_string())));

        match outcome {
            Ok(provider_message_id) => {
                if let Err(e) = self
                    .record_sent(campaign, channel, &recipient, &contact.id, provider_message_id, payload)
                    .await
                {
                    // the send went out; the recipient stays claimed as
                    // sent-unrecorded rather than risking a double-send
                    error!(recipient_id = %recipient.id, "Failed to record send: {}", e);
                }
            }
            Err(e) if e.is_permanent() => {
                self.settle_permanent_failure(campaign, &recipient, &e.to_string())
                    .await;
            }
            Err(e) => {
                if matches!(e, SendError::RateLimited) {
                    self.governor.backoff(channel.id, BACKOFF_PENALTY).await;
                }
                self.settle_transient_failure(campaign, channel, &recipient, &e.to_string())
                    .await;
            }
        }
    }

    /// Persist a successful send: conversation, message record, recipient
    /// settle, counter bump.
    async fn record_sent(
        &self,
        campaign: &Campaign,
        channel: &Channel,
        recipient: &CampaignRecipient,
        contact_id: &uuid::Uuid,
        provider_message_id: String,
        payload: &MessagePayload,
    ) -> Result<(), sqlx::Error> {
        let conversation = self
            .conversations
            .find_or_create_open(campaign.org_id, *contact_id, channel.id)
            .await?;

        let message = self
            .messages
            .create(CreateMessage {
                org_id: campaign.org_id,
                conversation_id: conversation.id,
                campaign_id: Some(campaign.id),
                contact_id: *contact_id,
                channel_id: channel.id,
                payload: payload.clone(),
                provider_message_id: Some(provider_message_id),
                status: MessageStatus::Sent,
            })
            .await?;

        self.conversations.touch_last_message(conversation.id).await?;

        // the settle is conditional on the claim, so a raced duplicate can
        // never bump the counter twice
        if self.cursor.settle_sent(recipient.id, message.id).await? {
            self.campaigns.increment_sent(campaign.id).await?;
        }

        Ok(())
    }

    async fn settle_permanent_failure(
        &self,
        campaign: &Campaign,
        recipient: &CampaignRecipient,
        reason: &str,
    ) {
        warn!(
            campaign_id = %campaign.id,
            recipient_id = %recipient.id,
            "Recipient failed permanently: {}",
            reason
        );

        match self.cursor.settle_failed(recipient.id, reason).await {
            Ok(true) => {
                if let Err(e) = self.campaigns.increment_failed(campaign.id).await {
                    error!(campaign_id = %campaign.id, "Failed counter update failed: {}", e);
                }
            }
            Ok(false) => {}
            Err(e) => error!(recipient_id = %recipient.id, "Failed to settle recipient: {}", e),
        }
    }

    async fn settle_transient_failure(
        &self,
        campaign: &Campaign,
        channel: &Channel,
        recipient: &CampaignRecipient,
        reason: &str,
    ) {
        warn!(
            campaign_id = %campaign.id,
            channel_id = %channel.id,
            recipient_id = %recipient.id,
            attempt = recipient.attempts,
            "Recipient send failed transiently: {}",
            reason
        );

        match self.cursor.release_transient(recipient.id, reason).await {
            // attempt budget exhausted; the transient failure became final
            Ok(Some(RecipientStatus::Failed)) => {
                if let Err(e) = self.campaigns.increment_failed(campaign.id).await {
                    error!(campaign_id = %campaign.id, "Failed counter update failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => error!(recipient_id = %recipient.id, "Failed to release recipient: {}", e),
        }
    }
}
