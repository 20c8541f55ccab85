//! Webhook ingress for delivery status callbacks
//!
//! Providers deliver callbacks at-least-once and out of order; the
//! reconciler absorbs both. Unknown message ids and stale statuses are
//! acknowledged with 200 anyway - rejecting a webhook only provokes a
//! provider-side retry storm. The one 4xx here is a bad HMAC signature.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use zapline_common::signature::verify_signature;
use zapline_core::{ReconcileOutcome, StatusUpdate};

use crate::auth::AppState;
use crate::handlers::{internal, ApiError, ErrorResponse};

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Status callback body: a single update or a batch
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StatusCallbackBody {
    Batch { statuses: Vec<StatusUpdate> },
    Single(StatusUpdate),
}

impl StatusCallbackBody {
    fn into_updates(self) -> Vec<StatusUpdate> {
        match self {
            StatusCallbackBody::Batch { statuses } => statuses,
            StatusCallbackBody::Single(update) => vec![update],
        }
    }
}

/// Acknowledgment with counts for observability
#[derive(Debug, Serialize)]
pub struct StatusCallbackResponse {
    pub applied: usize,
    pub stale: usize,
    pub dropped: usize,
}

/// Consume delivery status callbacks
///
/// POST /webhooks/status
pub async fn receive_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<StatusCallbackResponse>), ApiError> {
    if let Some(secret) = &state.webhook.app_secret {
        let header_value = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !verify_signature(secret, &body, header_value) {
            warn!("Webhook rejected: bad or missing signature");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("bad_signature", "Signature mismatch")),
            ));
        }
    }

    let updates = match serde_json::from_slice::<StatusCallbackBody>(&body) {
        Ok(parsed) => parsed.into_updates(),
        Err(e) => {
            // malformed callbacks are logged and dropped, still acknowledged
            warn!("Malformed status callback dropped: {}", e);
            return Ok((
                StatusCode::OK,
                Json(StatusCallbackResponse {
                    applied: 0,
                    stale: 0,
                    dropped: 1,
                }),
            ));
        }
    };

    let mut response = StatusCallbackResponse {
        applied: 0,
        stale: 0,
        dropped: 0,
    };

    for update in updates {
        match state.reconciler.apply(update).await {
            Ok(ReconcileOutcome::Applied) => response.applied += 1,
            Ok(ReconcileOutcome::Stale) => response.stale += 1,
            Ok(ReconcileOutcome::Unknown) => response.dropped += 1,
            Err(e) => {
                // storage failure: answer 5xx so the provider redelivers
                error!("Status reconciliation failed: {}", e);
                return Err(internal("Storage failure"));
            }
        }
    }

    Ok((StatusCode::OK, Json(response)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use zapline_storage::models::MessageStatus;

    #[test]
    fn test_single_and_batch_bodies_parse() {
        let single: StatusCallbackBody = serde_json::from_str(
            r#"{"provider_message_id": "wamid.1", "status": "sent"}"#,
        )
        .unwrap();
        assert_eq!(single.into_updates().len(), 1);

        let batch: StatusCallbackBody = serde_json::from_str(
            r#"{"statuses": [
                {"provider_message_id": "wamid.1", "status": "delivered"},
                {"provider_message_id": "wamid.2", "status": "failed", "error": "expired"}
            ]}"#,
        )
        .unwrap();

        let updates = batch.into_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].status, MessageStatus::Delivered);
        assert_eq!(updates[1].error.as_deref(), Some("expired"));
    }
}
