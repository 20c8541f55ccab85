//! Transport adapters over the outbound messaging providers
//!
//! Every provider error is normalized into [`SendError`]; callers never see
//! provider-specific shapes. An adapter performs the external call and
//! nothing else - persistence belongs to the dispatch layer.

mod cloud;
mod gateway;

pub use cloud::CloudApiTransport;
pub use gateway::GatewayTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use zapline_common::types::{MessagePayload, PhoneNumber};
use zapline_common::{Error, Result};
use zapline_storage::models::{Channel, ChannelProvider};

/// Outcome taxonomy for a failed send
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// Provider signalled backoff; retry later, not a permanent failure
    #[error("provider requested backoff")]
    RateLimited,

    /// The recipient cannot receive messages; never retried
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Misconfigured template or media; never retried
    #[error("payload rejected: {0}")]
    PayloadRejected(String),

    /// Transient provider or network problem; eligible for bounded retries
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl SendError {
    /// Permanent errors settle the recipient as failed immediately
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SendError::InvalidRecipient(_) | SendError::PayloadRejected(_)
        )
    }
}

/// A send attempt resolves to the provider-assigned message id
pub type SendResult = std::result::Result<String, SendError>;

/// Uniform interface over the outbound channels
#[async_trait]
pub trait Transport: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Send one message, returning the provider message id
    async fn send(&self, to: &PhoneNumber, payload: &MessagePayload) -> SendResult;
}

/// Credentials for the WhatsApp Business Cloud API
#[derive(Debug, Clone, Deserialize)]
pub struct CloudCredentials {
    pub access_token: String,
    pub phone_number_id: String,
}

/// Credentials for a self-hosted gateway instance
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayCredentials {
    pub base_url: String,
    pub api_key: String,
}

/// Builds transports from channel configuration.
///
/// One shared HTTP client; constructed once and injected wherever sends
/// happen, so tests can point channels at local stub servers.
#[derive(Clone)]
pub struct TransportResolver {
    client: reqwest::Client,
}

impl TransportResolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }

    /// Resolve the transport for a channel from its stored credentials
    pub fn resolve(&self, channel: &Channel) -> Result<Arc<dyn Transport>> {
        let provider = channel
            .provider_enum()
            .ok_or_else(|| Error::Config(format!("Unknown channel provider: {}", channel.provider)))?;

        match provider {
            ChannelProvider::Cloud => {
                let credentials: CloudCredentials =
                    serde_json::from_value(channel.credentials.clone()).map_err(|e| {
                        Error::Config(format!("Invalid cloud channel credentials: {}", e))
                    })?;
                Ok(Arc::new(CloudApiTransport::new(
                    self.client.clone(),
                    credentials,
                )))
            }
            ChannelProvider::Gateway => {
                let credentials: GatewayCredentials =
                    serde_json::from_value(channel.credentials.clone()).map_err(|e| {
                        Error::Config(format!("Invalid gateway channel credentials: {}", e))
                    })?;
                Ok(Arc::new(GatewayTransport::new(
                    self.client.clone(),
                    credentials,
                )))
            }
        }
    }
}

impl Default for TransportResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_send_error_permanence() {
        assert!(SendError::InvalidRecipient("x".into()).is_permanent());
        assert!(SendError::PayloadRejected("x".into()).is_permanent());
        assert!(!SendError::RateLimited.is_permanent());
        assert!(!SendError::ProviderUnavailable("x".into()).is_permanent());
    }

    #[test]
    fn test_resolver_rejects_malformed_credentials() {
        let resolver = TransportResolver::new();
        let channel = Channel {
            id: uuid::Uuid::new_v4(),
            org_id: uuid::Uuid::new_v4(),
            name: "main".to_string(),
            provider: "cloud".to_string(),
            phone_number: "15550100000".to_string(),
            credentials: serde_json::json!({"access_token": "tok"}),
            max_rate_per_sec: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(resolver.resolve(&channel).is_err());
    }
}
