//! Common types for Zapline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for organizations (tenants)
pub type OrgId = Uuid;

/// Unique identifier for channels
pub type ChannelId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for conversations
pub type ConversationId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign recipients
pub type RecipientId = Uuid;

/// Unique identifier for drip sequences
pub type SequenceId = Uuid;

/// Unique identifier for drip enrollments
pub type EnrollmentId = Uuid;

/// Unique identifier for messages
pub type MessageId = Uuid;

/// A phone number in E.164 form (digits only, optional leading `+`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse a phone number from a string, normalizing to bare digits.
    ///
    /// Accepts an optional leading `+` and common separators (spaces,
    /// dashes, parentheses); requires 7-15 digits after normalization.
    pub fn parse(s: &str) -> Option<Self> {
        let digits: String = s
            .trim()
            .trim_start_matches('+')
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
            .collect();

        if digits.len() < 7 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        Some(Self(digits))
    }

    /// The normalized digits, as sent to providers
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid phone number".to_string()))
    }
}

/// The message content of a campaign, drip step, or one-off send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Plain text message
    Text { body: String },

    /// Media message with an optional caption
    Media {
        media_type: MediaType,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },

    /// Pre-approved template message with positional parameters
    Template {
        name: String,
        #[serde(default = "default_template_language")]
        language: String,
        #[serde(default)]
        params: Vec<String>,
    },
}

fn default_template_language() -> String {
    "en".to_string()
}

impl MessagePayload {
    /// Short kind label used in logs and message rows
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePayload::Text { .. } => "text",
            MessagePayload::Media { .. } => "media",
            MessagePayload::Template { .. } => "template",
        }
    }
}

/// Media payload kinds supported by the providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Document,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Image => write!(f, "image"),
            MediaType::Video => write!(f, "video"),
            MediaType::Audio => write!(f, "audio"),
            MediaType::Document => write!(f, "document"),
        }
    }
}

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_phone_number_parse() {
        let phone = PhoneNumber::parse("+1 (555) 010-2030").unwrap();
        assert_eq!(phone.as_str(), "15550102030");
        assert_eq!(phone.to_string(), "15550102030");
    }

    #[test]
    fn test_phone_number_invalid() {
        assert!(PhoneNumber::parse("not-a-number").is_none());
        assert!(PhoneNumber::parse("123").is_none());
        assert!(PhoneNumber::parse("12345678901234567890").is_none());
    }

    #[test]
    fn test_payload_roundtrip_tagging() {
        let payload = MessagePayload::Template {
            name: "order_update".to_string(),
            language: "en".to_string(),
            params: vec!["ZL-1042".to_string()],
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "template");
        assert_eq!(json["name"], "order_update");

        let back: MessagePayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_payload_kind() {
        let payload = MessagePayload::Text {
            body: "hello".to_string(),
        };
        assert_eq!(payload.kind(), "text");
    }
}
