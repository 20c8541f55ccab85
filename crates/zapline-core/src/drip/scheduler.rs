//! Drip scheduler - periodic sweep advancing active enrollments
//!
//! Each sweep picks up due enrollments of active sequences, dispatches the
//! next step through the same governor/transport path as campaign sends,
//! and computes the following due time from the next step's configured
//! delay. A step with no delay (or nothing after the one just sent) is
//! scheduled for "now", so the next sweep either sends it immediately or
//! observes that no step remains and completes the enrollment. Nothing ever
//! stalls indefinitely waiting for a missing delay.
//!
//! One broken enrollment never aborts the sweep: its error is recorded on
//! the row and the loop moves on.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use zapline_common::config::{DispatchConfig, DripConfig};
use zapline_common::types::PhoneNumber;
use zapline_storage::db::DatabasePool;
use zapline_storage::models::{Campaign, CreateMessage, DripEnrollment, MessageStatus};
use zapline_storage::repository::{
    CampaignRepository, ChannelRepository, ContactRepository, ConversationRepository,
    DripEnrollmentRepository, DripSequenceRepository, MessageRepository,
};

use crate::dispatch::{effective_rate, RateGovernor};
use crate::transport::{SendError, TransportResolver};

/// What one sweep did, for observability
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Enrollments whose next step was dispatched
    pub processed: usize,
    /// Enrollments that ran out of steps and completed
    pub completed: usize,
    /// Enrollments skipped with a recorded error
    pub errors: usize,
}

enum StepOutcome {
    Sent,
    Completed,
    /// Enrollment cancelled (opt-out, permanent provider rejection)
    Cancelled,
}

/// Drip scheduler
pub struct DripScheduler {
    sequences: DripSequenceRepository,
    enrollments: DripEnrollmentRepository,
    campaigns: CampaignRepository,
    contacts: ContactRepository,
    channels: ChannelRepository,
    conversations: ConversationRepository,
    messages: MessageRepository,
    governor: Arc<RateGovernor>,
    transports: TransportResolver,
    config: DripConfig,
    send_timeout: StdDuration,
}

impl DripScheduler {
    /// Create a new drip scheduler
    pub fn new(
        db_pool: DatabasePool,
        governor: Arc<RateGovernor>,
        transports: TransportResolver,
        config: DripConfig,
        dispatch: &DispatchConfig,
    ) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            sequences: DripSequenceRepository::new(pool.clone()),
            enrollments: DripEnrollmentRepository::new(pool.clone()),
            campaigns: CampaignRepository::new(pool.clone()),
            contacts: ContactRepository::new(pool.clone()),
            channels: ChannelRepository::new(pool.clone()),
            conversations: ConversationRepository::new(pool.clone()),
            messages: MessageRepository::new(pool),
            governor,
            transports,
            config,
            send_timeout: StdDuration::from_secs(dispatch.send_timeout_secs),
        }
    }

    /// Run the periodic sweep loop
    pub async fn run(&self) {
        let mut ticker = interval(StdDuration::from_secs(self.config.sweep_interval_secs.max(1)));

        info!(
            "Drip scheduler started (every {}s)",
            self.config.sweep_interval_secs
        );

        loop {
            ticker.tick().await;

            match self.sweep().await {
                Ok(report) => {
                    if report.processed > 0 || report.completed > 0 || report.errors > 0 {
                        info!(
                            processed = report.processed,
                            completed = report.completed,
                            errors = report.errors,
                            "Drip sweep"
                        );
                    }
                }
                Err(e) => error!("Drip sweep failed: {}", e),
            }
        }
    }

    /// One sweep over all due enrollments
    pub async fn sweep(&self) -> Result<SweepReport> {
        let due = self
            .enrollments
            .list_due(Utc::now(), self.config.batch_size)
            .await
            .context("listing due enrollments")?;

        let mut report = SweepReport::default();

        for enrollment in due {
            match self.advance_enrollment(&enrollment).await {
                Ok(StepOutcome::Sent) => report.processed += 1,
                Ok(StepOutcome::Completed) => report.completed += 1,
                Ok(StepOutcome::Cancelled) => {}
                Err(e) => {
                    warn!(
                        enrollment_id = %enrollment.id,
                        sequence_id = %enrollment.sequence_id,
                        "Drip enrollment skipped: {}",
                        e
                    );
                    if let Err(e) = self
                        .enrollments
                        .record_error(enrollment.id, &e.to_string())
                        .await
                    {
                        error!(enrollment_id = %enrollment.id, "Failed to record error: {}", e);
                    }
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Dispatch the next step of one enrollment and reschedule it.
    /// Transient send failures leave the row untouched, so the next sweep
    /// retries it - that implicit retry is the deliberate design here.
    async fn advance_enrollment(&self, enrollment: &DripEnrollment) -> Result<StepOutcome> {
        let sequence = self
            .sequences
            .get_by_org(enrollment.org_id, enrollment.sequence_id)
            .await?
            .ok_or_else(|| anyhow!("sequence no longer exists"))?;

        let step_order = enrollment.current_step + 1;
        let Some(step) = self
            .campaigns
            .get_drip_step(sequence.id, step_order)
            .await?
        else {
            self.enrollments.complete(enrollment.id).await?;
            debug!(enrollment_id = %enrollment.id, "Enrollment completed");
            return Ok(StepOutcome::Completed);
        };

        let contact = self
            .contacts
            .get_by_org(enrollment.org_id, enrollment.contact_id)
            .await?
            .ok_or_else(|| anyhow!("contact no longer exists"))?;

        if !contact.is_opted_in {
            self.enrollments
                .cancel(enrollment.org_id, enrollment.id, Some("contact opted out"))
                .await?;
            return Ok(StepOutcome::Cancelled);
        }

        let phone = PhoneNumber::parse(&contact.phone)
            .ok_or_else(|| anyhow!("invalid contact phone number"))?;

        let channel = self
            .channels
            .get_by_org(enrollment.org_id, sequence.channel_id)
            .await?
            .ok_or_else(|| anyhow!("sequence channel no longer exists"))?;

        let payload = step.payload().context("unreadable step payload")?;
        let transport = self
            .transports
            .resolve(&channel)
            .map_err(|e| anyhow!("transport unavailable: {}", e))?;

        let rate = effective_rate(step.clamped_rate(), channel.max_rate_per_sec);
        self.governor.acquire(channel.id, rate).await;

        let outcome = tokio::time::timeout(self.send_timeout, transport.send(&phone, &payload))
            .await
            .unwrap_or_else(|_| Err(SendError::ProviderUnavailable("send timed out".to_string())));

        let provider_message_id = match outcome {
            Ok(id) => id,
            Err(e) if e.is_permanent() => {
                self.enrollments
                    .cancel(enrollment.org_id, enrollment.id, Some(&e.to_string()))
                    .await?;
                warn!(
                    enrollment_id = %enrollment.id,
                    "Enrollment cancelled after permanent send failure: {}",
                    e
                );
                return Ok(StepOutcome::Cancelled);
            }
            // transient: leave the due time alone, the next sweep retries
            Err(e) => bail!("send failed: {}", e),
        };

        let conversation = self
            .conversations
            .find_or_create_open(enrollment.org_id, contact.id, channel.id)
            .await?;

        self.messages
            .create(CreateMessage {
                org_id: enrollment.org_id,
                conversation_id: conversation.id,
                campaign_id: Some(step.id),
                contact_id: contact.id,
                channel_id: channel.id,
                payload,
                provider_message_id: Some(provider_message_id),
                status: MessageStatus::Sent,
            })
            .await?;
        self.conversations.touch_last_message(conversation.id).await?;
        self.campaigns.increment_sent(step.id).await?;

        let following = self
            .campaigns
            .get_drip_step(sequence.id, step_order + 1)
            .await?;
        let next_due = next_due_after(Utc::now(), following.as_ref());

        // step pointer and due time move in the same update; a raced sweep
        // that already advanced the row turns this into a no-op
        self.enrollments
            .advance(enrollment.id, enrollment.current_step, step_order, next_due)
            .await?;

        debug!(
            enrollment_id = %enrollment.id,
            step = step_order,
            next_due = %next_due,
            "Drip step dispatched"
        );

        Ok(StepOutcome::Sent)
    }
}

/// Due time for the step after the one just sent: its configured delay
/// from now. A missing or zero delay - and a missing following step -
/// schedule "now", so the next sweep processes or completes the enrollment
/// immediately instead of stalling.
pub fn next_due_after(now: DateTime<Utc>, following: Option<&Campaign>) -> DateTime<Utc> {
    let minutes = following
        .and_then(|step| step.delay_minutes)
        .unwrap_or(0)
        .max(0);
    now + Duration::minutes(i64::from(minutes))
}

/// First due time for a fresh enrollment: the first step's delay from the
/// trigger instant.
pub fn first_due_at(now: DateTime<Utc>, first_step: Option<&Campaign>) -> DateTime<Utc> {
    next_due_after(now, first_step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn step(order: i32, delay_minutes: Option<i32>) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            name: format!("step-{}", order),
            payload: serde_json::json!({"type": "text", "body": "hi"}),
            rate_per_sec: 5,
            status: "draft".to_string(),
            scheduled_at: None,
            drip_sequence_id: Some(Uuid::new_v4()),
            step_order: Some(order),
            delay_minutes,
            total_recipients: 0,
            sent_count: 0,
            delivered_count: 0,
            failed_count: 0,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_three_step_sequence_timeline() {
        // delays [0, 60, 120]: step 1 fires at enrollment time, step 2
        // sixty minutes later, step 3 a hundred and twenty after that
        let steps = [step(1, Some(0)), step(2, Some(60)), step(3, Some(120))];
        let t0 = Utc::now();

        let enrolled = first_due_at(t0, Some(&steps[0]));
        assert_eq!(enrolled, t0);

        // sweep at t0 sends step 1, schedules step 2
        let after_step1 = next_due_after(t0, Some(&steps[1]));
        assert_eq!(after_step1, t0 + Duration::minutes(60));

        // sweep at t0+60 sends step 2, schedules step 3
        let after_step2 = next_due_after(after_step1, Some(&steps[2]));
        assert_eq!(after_step2, t0 + Duration::minutes(180));

        // sweep at t0+180 sends step 3; nothing follows, so the enrollment
        // is rescheduled for now and the next sweep completes it
        let after_step3 = next_due_after(after_step2, None);
        assert_eq!(after_step3, after_step2);
    }

    #[test]
    fn test_missing_delay_defaults_to_now() {
        let now = Utc::now();
        assert_eq!(next_due_after(now, Some(&step(2, None))), now);
        assert_eq!(next_due_after(now, Some(&step(2, Some(0)))), now);
    }

    #[test]
    fn test_negative_delay_is_clamped() {
        let now = Utc::now();
        assert_eq!(next_due_after(now, Some(&step(2, Some(-5)))), now);
    }
}
