//! WhatsApp Business Cloud API transport
//!
//! Speaks the official Cloud API (Graph) message endpoint. Provider error
//! payloads look like `{"error": {"code": 131026, "message": "..."}}`; the
//! interesting codes are mapped below and everything else falls back on the
//! HTTP status class.

use async_trait::async_trait;
use serde::Deserialize;
use zapline_common::types::{MessagePayload, PhoneNumber};

use super::{CloudCredentials, SendError, SendResult, Transport};

const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v21.0";

/// Cloud API error codes that mean the recipient can never be reached
const INVALID_RECIPIENT_CODES: &[i64] = &[131026, 131030, 131021];

/// Cloud API error codes for throughput/backoff signals
const RATE_LIMIT_CODES: &[i64] = &[4, 80007, 130429, 131048, 131056];

/// Cloud API transport
pub struct CloudApiTransport {
    client: reqwest::Client,
    credentials: CloudCredentials,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl CloudApiTransport {
    pub fn new(client: reqwest::Client, credentials: CloudCredentials) -> Self {
        Self {
            client,
            credentials,
            base_url: GRAPH_BASE_URL.to_string(),
        }
    }

    /// Override the Graph endpoint (sandbox proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn message_body(&self, to: &PhoneNumber, payload: &MessagePayload) -> serde_json::Value {
        let mut body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to.as_str(),
        });

        match payload {
            MessagePayload::Text { body: text } => {
                body["type"] = serde_json::json!("text");
                body["text"] = serde_json::json!({
                    "preview_url": false,
                    "body": text,
                });
            }
            MessagePayload::Media {
                media_type,
                url,
                caption,
            } => {
                let kind = media_type.to_string();
                let mut media = serde_json::json!({ "link": url });
                if let Some(caption) = caption {
                    media["caption"] = serde_json::json!(caption);
                }
                body["type"] = serde_json::json!(kind);
                body[kind] = media;
            }
            MessagePayload::Template {
                name,
                language,
                params,
            } => {
                let mut template = serde_json::json!({
                    "name": name,
                    "language": { "code": language },
                });
                if !params.is_empty() {
                    let parameters: Vec<serde_json::Value> = params
                        .iter()
                        .map(|p| serde_json::json!({ "type": "text", "text": p }))
                        .collect();
                    template["components"] = serde_json::json!([{
                        "type": "body",
                        "parameters": parameters,
                    }]);
                }
                body["type"] = serde_json::json!("template");
                body["template"] = template;
            }
        }

        body
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> SendError {
        if status.as_u16() == 429 {
            return SendError::RateLimited;
        }

        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
            if let Some(error) = parsed.error {
                if RATE_LIMIT_CODES.contains(&error.code) {
                    return SendError::RateLimited;
                }
                if INVALID_RECIPIENT_CODES.contains(&error.code) {
                    return SendError::InvalidRecipient(error.message);
                }
                // 132xxx: template does not exist / parameter mismatch
                if (132000..133000).contains(&error.code)
                    || error.code == 131008
                    || error.code == 131009
                {
                    return SendError::PayloadRejected(error.message);
                }
                if status.is_server_error() {
                    return SendError::ProviderUnavailable(error.message);
                }
                return SendError::PayloadRejected(error.message);
            }
        }

        if status.is_server_error() {
            SendError::ProviderUnavailable(format!("HTTP {}", status))
        } else {
            SendError::PayloadRejected(format!("HTTP {}", status))
        }
    }
}

#[async_trait]
impl Transport for CloudApiTransport {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn send(&self, to: &PhoneNumber, payload: &MessagePayload) -> SendResult {
        let url = format!(
            "{}/{}/messages",
            self.base_url, self.credentials.phone_number_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.credentials.access_token)
            .json(&self.message_body(to, payload))
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

        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| {
                SendError::ProviderUnavailable("response carried no message id".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> CloudApiTransport {
        CloudApiTransport::new(
            reqwest::Client::new(),
            CloudCredentials {
                access_token: "token".to_string(),
                phone_number_id: "1065000000".to_string(),
            },
        )
        .with_base_url(server.uri())
    }

    fn text_payload() -> MessagePayload {
        MessagePayload::Text {
            body: "hello".to_string(),
        }
    }

    fn recipient() -> PhoneNumber {
        PhoneNumber::parse("15550102030").unwrap()
    }

    #[tokio::test]
    async fn test_send_text_returns_provider_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/1065000000/messages"))
            .and(header("authorization", "Bearer token"))
            .and(body_partial_json(serde_json::json!({
                "messaging_product": "whatsapp",
                "to": "15550102030",
                "type": "text",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "wamid.ABGGfl"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = transport(&server)
            .send(&recipient(), &text_payload())
            .await
            .unwrap();

        assert_eq!(id, "wamid.ABGGfl");
    }

    #[tokio::test]
    async fn test_http_429_maps_to_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(&recipient(), &text_payload())
            .await
            .unwrap_err();

        assert_eq!(err, SendError::RateLimited);
    }

    #[tokio::test]
    async fn test_throughput_code_maps_to_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 130429, "message": "Rate limit hit"}
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(&recipient(), &text_payload())
            .await
            .unwrap_err();

        assert_eq!(err, SendError::RateLimited);
    }

    #[tokio::test]
    async fn test_undeliverable_maps_to_invalid_recipient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 131026, "message": "Message undeliverable"}
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(&recipient(), &text_payload())
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn test_template_error_maps_to_payload_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 132001, "message": "Template name does not exist"}
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(
                &recipient(),
                &MessagePayload::Template {
                    name: "missing".to_string(),
                    language: "en".to_string(),
                    params: vec![],
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::PayloadRejected(_)));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_provider_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(&recipient(), &text_payload())
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::ProviderUnavailable(_)));
    }

    #[test]
    fn test_media_body_shape() {
        let transport = CloudApiTransport::new(
            reqwest::Client::new(),
            CloudCredentials {
                access_token: "t".to_string(),
                phone_number_id: "p".to_string(),
            },
        );

        let body = transport.message_body(
            &recipient(),
            &MessagePayload::Media {
                media_type: zapline_common::types::MediaType::Image,
                url: "https://cdn.example.com/sale.jpg".to_string(),
                caption: Some("June sale".to_string()),
            },
        );

        assert_eq!(body["type"], "image");
        assert_eq!(body["image"]["link"], "https://cdn.example.com/sale.jpg");
        assert_eq!(body["image"]["caption"], "June sale");
    }
}
