//! Self-hosted WhatsApp gateway transport
//!
//! Gateways expose a small REST surface: `POST /api/v1/messages` with a
//! bearer key, answering `{"message_id": "..."}` on success or
//! `{"code": "...", "error": "..."}` on rejection.

use async_trait::async_trait;
use serde::Deserialize;
use zapline_common::types::{MessagePayload, PhoneNumber};

use super::{GatewayCredentials, SendError, SendResult, Transport};

/// Self-hosted gateway transport
pub struct GatewayTransport {
    client: reqwest::Client,
    credentials: GatewayCredentials,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    error: String,
}

impl GatewayTransport {
    pub fn new(client: reqwest::Client, credentials: GatewayCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    fn message_body(to: &PhoneNumber, payload: &MessagePayload) -> serde_json::Value {
        match payload {
            MessagePayload::Text { body } => serde_json::json!({
                "to": to.as_str(),
                "type": "text",
                "body": body,
            }),
            MessagePayload::Media {
                media_type,
                url,
                caption,
            } => serde_json::json!({
                "to": to.as_str(),
                "type": "media",
                "media_type": media_type.to_string(),
                "url": url,
                "caption": caption,
            }),
            // Gateways relay templates as pre-rendered text
            MessagePayload::Template { name, params, .. } => serde_json::json!({
                "to": to.as_str(),
                "type": "template",
                "template": name,
                "params": params,
            }),
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> SendError {
        if status.as_u16() == 429 {
            return SendError::RateLimited;
        }

        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
            match parsed.code.as_str() {
                "invalid_number" | "not_on_whatsapp" => {
                    return SendError::InvalidRecipient(parsed.error)
                }
                "unsupported_payload" | "invalid_template" | "media_unreachable" => {
                    return SendError::PayloadRejected(parsed.error)
                }
                "throttled" => return SendError::RateLimited,
                _ => {}
            }
            if status.is_server_error() {
                return SendError::ProviderUnavailable(parsed.error);
            }
        }

        // unknown client errors included: the gateway may be
        // mid-reconfiguration, keep the recipient retryable
        SendError::ProviderUnavailable(format!("HTTP {}", status))
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn send(&self, to: &PhoneNumber, payload: &MessagePayload) -> SendResult {
        let url = format!(
            "{}/api/v1/messages",
            self.credentials.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.credentials.api_key)
            .json(&Self::message_body(to, payload))
            .send()
            .await
            .map_err(|e| SendError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| SendError::ProviderUnavailable(format!("malformed response: {}", e)))?;

        Ok(parsed.message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> GatewayTransport {
        GatewayTransport::new(
            reqwest::Client::new(),
            GatewayCredentials {
                base_url: server.uri(),
                api_key: "gw-key".to_string(),
            },
        )
    }

    fn recipient() -> PhoneNumber {
        PhoneNumber::parse("15550102030").unwrap()
    }

    #[tokio::test]
    async fn test_send_text_returns_message_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/messages"))
            .and(header("authorization", "Bearer gw-key"))
            .and(body_partial_json(serde_json::json!({
                "to": "15550102030",
                "type": "text",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message_id": "gw-7f2c"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = transport(&server)
            .send(
                &recipient(),
                &MessagePayload::Text {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(id, "gw-7f2c");
    }

    #[tokio::test]
    async fn test_invalid_number_maps_to_invalid_recipient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "code": "invalid_number",
                "error": "not a WhatsApp number"
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(
                &recipient(),
                &MessagePayload::Text {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn test_throttled_maps_to_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "code": "throttled",
                "error": "slow down"
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(
                &recipient(),
                &MessagePayload::Text {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err, SendError::RateLimited);
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_provider_unavailable() {
        // no server listening on this port
        let transport = GatewayTransport::new(
            reqwest::Client::new(),
            GatewayCredentials {
                base_url: "http://127.0.0.1:1".to_string(),
                api_key: "k".to_string(),
            },
        );

        let err = transport
            .send(
                &recipient(),
                &MessagePayload::Text {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::ProviderUnavailable(_)));
    }
}
