//! Authentication module

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};
use uuid::Uuid;
use zapline_common::config::{DispatchConfig, WebhookConfig};
use zapline_common::types::OrgId;
use zapline_core::{CampaignEngine, StatusReconciler};
use zapline_storage::models::ApiKey;
use zapline_storage::repository::ApiKeyRepository;
use zapline_storage::DatabasePool;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabasePool,
    pub engine: Arc<CampaignEngine>,
    pub reconciler: Arc<StatusReconciler>,
    pub dispatch: DispatchConfig,
    pub webhook: WebhookConfig,
}

/// Authenticated context extracted from an API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The organization this API key belongs to
    pub org_id: OrgId,
    /// API key ID for audit logging
    pub api_key_id: Uuid,
}

impl AuthContext {
    /// Check if the request is authorized for the given organization
    pub fn is_authorized_for_org(&self, org_id: OrgId) -> bool {
        self.org_id == org_id
    }
}

/// Require that the authenticated key belongs to the organization in the path
pub fn require_org_access(auth: &AuthContext, org_id: OrgId) -> Result<(), StatusCode> {
    if auth.is_authorized_for_org(org_id) {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

/// Extract API key from request
fn extract_api_key(req: &Request) -> Option<&str> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key);
            }
        }
    }

    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str);
        }
    }

    None
}

/// Extract the prefix from an API key (first 8 characters)
fn extract_key_prefix(api_key: &str) -> Option<&str> {
    if api_key.len() >= 8 {
        Some(&api_key[..8])
    } else {
        None
    }
}

/// Hash an API key for comparison
fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a stored hash.
///
/// Supports Argon2 hashes (`$argon2...`) and legacy SHA-256 hex hashes.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key) == stored_hash
}

/// Validate an API key against the database
async fn validate_api_key(db_pool: &DatabasePool, api_key: &str) -> Result<ApiKey, StatusCode> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        StatusCode::UNAUTHORIZED
    })?;

    let repo = ApiKeyRepository::new(db_pool.pool().clone());

    let candidates = repo.find_by_prefix(prefix).await.map_err(|e| {
        error!("Database error while looking up API key: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    for candidate in candidates {
        if verify_api_key(api_key, &candidate.key_hash) {
            if let Err(e) = repo.touch_last_used(candidate.id).await {
                debug!("Failed to stamp API key use: {}", e);
            }
            return Ok(candidate);
        }
    }

    warn!("API key rejected (prefix {})", prefix);
    Err(StatusCode::UNAUTHORIZED)
}

/// Authentication middleware for the tenant-scoped API
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let api_key = extract_api_key(&req).ok_or(StatusCode::UNAUTHORIZED)?;
    let key = validate_api_key(&state.db_pool, api_key).await?;

    req.extensions_mut().insert(AuthContext {
        org_id: key.org_id,
        api_key_id: key.id,
    });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_extraction() {
        assert_eq!(extract_key_prefix("zl_12345678abc"), Some("zl_12345"));
        assert_eq!(extract_key_prefix("short"), None);
    }

    #[test]
    fn test_sha256_verification() {
        let key = "zl_livekey_0042";
        let hash = hash_api_key(key);
        assert!(verify_api_key(key, &hash));
        assert!(!verify_api_key("zl_livekey_0043", &hash));
    }
}
