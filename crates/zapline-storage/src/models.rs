//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use zapline_common::types::{
    CampaignId, ChannelId, ContactId, ConversationId, EnrollmentId, MessageId, MessagePayload,
    OrgId, RecipientId, SequenceId,
};

/// Channel provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelProvider {
    /// WhatsApp Business Cloud API
    Cloud,
    /// Self-hosted WhatsApp gateway
    Gateway,
}

impl std::fmt::Display for ChannelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelProvider::Cloud => write!(f, "cloud"),
            ChannelProvider::Gateway => write!(f, "gateway"),
        }
    }
}

impl std::str::FromStr for ChannelProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud" => Ok(ChannelProvider::Cloud),
            "gateway" => Ok(ChannelProvider::Gateway),
            _ => Err(format!("Invalid channel provider: {}", s)),
        }
    }
}

/// Channel model - a configured outbound messaging endpoint
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub org_id: OrgId,
    pub name: String,
    pub provider: String,
    pub phone_number: String,
    /// Provider credentials (access token + phone number id, or
    /// gateway base URL + API key)
    pub credentials: serde_json::Value,
    /// Absolute provider-level ceiling for this channel
    pub max_rate_per_sec: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Get provider enum
    pub fn provider_enum(&self) -> Option<ChannelProvider> {
        self.provider.parse().ok()
    }
}

/// Create channel input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChannel {
    pub org_id: OrgId,
    pub name: String,
    pub provider: ChannelProvider,
    pub phone_number: String,
    pub credentials: serde_json::Value,
    pub max_rate_per_sec: Option<i32>,
}

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub org_id: OrgId,
    pub phone: String,
    pub name: Option<String>,
    pub is_opted_in: bool,
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create contact input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContact {
    pub org_id: OrgId,
    pub phone: String,
    pub name: Option<String>,
    pub is_opted_in: Option<bool>,
    pub attributes: Option<serde_json::Value>,
}

/// Conversation model - the anchor for message records per (contact, channel)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub org_id: OrgId,
    pub contact_id: ContactId,
    pub channel_id: ChannelId,
    pub status: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    /// Whether the campaign may transition into `Running` from this state
    pub fn can_start(self) -> bool {
        matches!(
            self,
            CampaignStatus::Draft | CampaignStatus::Scheduled | CampaignStatus::Paused
        )
    }

    /// Whether this is a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Running => write!(f, "running"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "running" => Ok(CampaignStatus::Running),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
///
/// A drip step is a campaign with `drip_sequence_id` and `step_order` set;
/// such campaigns are dispatched one recipient at a time by the drip
/// scheduler instead of the bulk engine.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub org_id: OrgId,
    pub channel_id: ChannelId,
    pub name: String,
    pub payload: serde_json::Value,
    /// Requested pacing, messages per second (clamped to 1..=10)
    pub rate_per_sec: i32,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub drip_sequence_id: Option<SequenceId>,
    pub step_order: Option<i32>,
    /// Minutes after the previous step before this step is due
    pub delay_minutes: Option<i32>,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub failed_count: i32,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Deserialize the message payload
    pub fn payload(&self) -> Result<MessagePayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Whether this campaign is a drip step
    pub fn is_drip_step(&self) -> bool {
        self.drip_sequence_id.is_some()
    }

    /// Requested rate clamped into the supported 1..=10 range
    pub fn clamped_rate(&self) -> i32 {
        self.rate_per_sec.clamp(1, 10)
    }

    /// Calculate progress percentage
    pub fn progress_percentage(&self) -> f64 {
        if self.total_recipients == 0 {
            0.0
        } else {
            ((self.sent_count + self.failed_count) as f64 / self.total_recipients as f64) * 100.0
        }
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub org_id: OrgId,
    pub channel_id: ChannelId,
    pub name: String,
    pub payload: MessagePayload,
    pub rate_per_sec: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub drip_sequence_id: Option<SequenceId>,
    pub step_order: Option<i32>,
    pub delay_minutes: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// Update campaign input (draft campaigns only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub payload: Option<MessagePayload>,
    pub rate_per_sec: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// Per-recipient delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    /// Claimed by a dispatch loop, send in flight
    Sending,
    Sent,
    Delivered,
    Failed,
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientStatus::Pending => write!(f, "pending"),
            RecipientStatus::Sending => write!(f, "sending"),
            RecipientStatus::Sent => write!(f, "sent"),
            RecipientStatus::Delivered => write!(f, "delivered"),
            RecipientStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RecipientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecipientStatus::Pending),
            "sending" => Ok(RecipientStatus::Sending),
            "sent" => Ok(RecipientStatus::Sent),
            "delivered" => Ok(RecipientStatus::Delivered),
            "failed" => Ok(RecipientStatus::Failed),
            _ => Err(format!("Invalid recipient status: {}", s)),
        }
    }
}

/// Campaign recipient model - joins a campaign to one contact
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignRecipient {
    pub id: RecipientId,
    pub campaign_id: CampaignId,
    pub org_id: OrgId,
    pub contact_id: ContactId,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub message_id: Option<MessageId>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignRecipient {
    /// Get status enum
    pub fn status_enum(&self) -> Option<RecipientStatus> {
        self.status.parse().ok()
    }
}

/// Counts of campaign recipients by status
#[derive(Debug, Clone, Default)]
pub struct RecipientStatusCounts {
    pub pending: i64,
    pub sending: i64,
    pub sent: i64,
    pub delivered: i64,
    pub failed: i64,
}

impl RecipientStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.sending + self.sent + self.delivered + self.failed
    }

    /// Recipients not yet in a settled state
    pub fn unsettled(&self) -> i64 {
        self.pending + self.sending
    }
}

/// Drip sequence model - an ordered template of step campaigns
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DripSequence {
    pub id: SequenceId,
    pub org_id: OrgId,
    pub channel_id: ChannelId,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create drip sequence input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDripSequence {
    pub org_id: OrgId,
    pub channel_id: ChannelId,
    pub name: String,
}

/// Drip enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EnrollmentStatus::Completed | EnrollmentStatus::Cancelled)
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentStatus::Active => write!(f, "active"),
            EnrollmentStatus::Completed => write!(f, "completed"),
            EnrollmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "completed" => Ok(EnrollmentStatus::Completed),
            "cancelled" => Ok(EnrollmentStatus::Cancelled),
            _ => Err(format!("Invalid enrollment status: {}", s)),
        }
    }
}

/// Drip enrollment model - one contact's progress through one sequence
///
/// `next_message_at` is NULL exactly when the status is terminal.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DripEnrollment {
    pub id: EnrollmentId,
    pub org_id: OrgId,
    pub sequence_id: SequenceId,
    pub contact_id: ContactId,
    /// Highest step order already dispatched (0 = none yet)
    pub current_step: i32,
    pub next_message_at: Option<DateTime<Utc>>,
    pub status: String,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DripEnrollment {
    /// Get status enum
    pub fn status_enum(&self) -> Option<EnrollmentStatus> {
        self.status.parse().ok()
    }
}

/// Message status, strictly advancing: queued < sent < delivered < read.
/// `failed` is a terminal branch reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Precedence rank for the advancing sequence. `Failed` has no rank;
    /// it is applied as a terminal override instead.
    pub fn rank(self) -> Option<i32> {
        match self {
            MessageStatus::Queued => Some(0),
            MessageStatus::Sent => Some(1),
            MessageStatus::Delivered => Some(2),
            MessageStatus::Read => Some(3),
            MessageStatus::Failed => None,
        }
    }

    /// Whether a recorded status may be replaced by `candidate`
    pub fn admits(self, candidate: MessageStatus) -> bool {
        match (self, candidate) {
            (MessageStatus::Failed, _) => false,
            (_, MessageStatus::Failed) => true,
            (current, next) => match (current.rank(), next.rank()) {
                (Some(cur), Some(new)) => new > cur,
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Queued => write!(f, "queued"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MessageStatus::Queued),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// Message model - the durable record of one unit of communication
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub org_id: OrgId,
    pub conversation_id: ConversationId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: ContactId,
    pub channel_id: ChannelId,
    pub direction: String,
    pub payload: serde_json::Value,
    /// Provider-assigned id, the key delivery callbacks arrive under
    pub provider_message_id: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MessageStatus> {
        self.status.parse().ok()
    }
}

/// Create message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub org_id: OrgId,
    pub conversation_id: ConversationId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: ContactId,
    pub channel_id: ChannelId,
    pub payload: MessagePayload,
    pub provider_message_id: Option<String>,
    pub status: MessageStatus,
}

/// API key model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: uuid::Uuid,
    pub org_id: OrgId,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Campaign statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStats {
    pub campaign_id: CampaignId,
    pub status: String,
    pub total_recipients: i32,
    pub sent: i32,
    pub delivered: i32,
    pub failed: i32,
    pub pending: i64,
    pub progress_percentage: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_campaign_status_roundtrip() {
        for status in [
            CampaignStatus::Draft,
            CampaignStatus::Scheduled,
            CampaignStatus::Running,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<CampaignStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_campaign_start_transitions() {
        assert!(CampaignStatus::Draft.can_start());
        assert!(CampaignStatus::Scheduled.can_start());
        assert!(CampaignStatus::Paused.can_start());
        assert!(!CampaignStatus::Running.can_start());
        assert!(!CampaignStatus::Completed.can_start());
        assert!(!CampaignStatus::Cancelled.can_start());
    }

    #[test]
    fn test_message_status_admits_forward_only() {
        use MessageStatus::*;

        assert!(Queued.admits(Sent));
        assert!(Sent.admits(Delivered));
        assert!(Sent.admits(Read));
        assert!(!Delivered.admits(Sent));
        assert!(!Read.admits(Delivered));
        assert!(!Sent.admits(Sent));
    }

    #[test]
    fn test_message_status_failed_is_terminal_override() {
        use MessageStatus::*;

        assert!(Queued.admits(Failed));
        assert!(Sent.admits(Failed));
        assert!(Read.admits(Failed));
        assert!(!Failed.admits(Sent));
        assert!(!Failed.admits(Read));
        assert!(!Failed.admits(Failed));
    }

    #[test]
    fn test_recipient_counts() {
        let counts = RecipientStatusCounts {
            pending: 3,
            sending: 1,
            sent: 4,
            delivered: 2,
            failed: 1,
        };
        assert_eq!(counts.total(), 11);
        assert_eq!(counts.unsettled(), 4);
    }

    #[test]
    fn test_campaign_rate_clamp() {
        let mut campaign = sample_campaign();
        campaign.rate_per_sec = 50;
        assert_eq!(campaign.clamped_rate(), 10);
        campaign.rate_per_sec = 0;
        assert_eq!(campaign.clamped_rate(), 1);
        campaign.rate_per_sec = 7;
        assert_eq!(campaign.clamped_rate(), 7);
    }

    fn sample_campaign() -> Campaign {
        Campaign {
            id: uuid::Uuid::new_v4(),
            org_id: uuid::Uuid::new_v4(),
            channel_id: uuid::Uuid::new_v4(),
            name: "promo".to_string(),
            payload: serde_json::json!({"type": "text", "body": "hi"}),
            rate_per_sec: 5,
            status: "draft".to_string(),
            scheduled_at: None,
            drip_sequence_id: None,
            step_order: None,
            delay_minutes: None,
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
}
