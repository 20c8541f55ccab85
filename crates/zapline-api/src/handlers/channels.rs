//! Channel handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;
use zapline_storage::models::{Channel, ChannelProvider, CreateChannel};
use zapline_storage::repository::ChannelRepository;

use crate::auth::{require_org_access, AppState, AuthContext};
use crate::handlers::{forbidden, internal, not_found, validation, ApiError};

/// Request body for creating a channel
#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    pub provider: ChannelProvider,
    pub phone_number: String,
    pub credentials: serde_json::Value,
    pub max_rate_per_sec: Option<i32>,
}

/// List channels for an organization
///
/// GET /api/v1/orgs/:org_id/channels
pub async fn list_channels(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<Channel>>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = ChannelRepository::new(state.db_pool.pool().clone());
    let channels = repo.list_by_org(org_id).await.map_err(|e| {
        error!("Failed to list channels: {}", e);
        internal("Failed to list channels")
    })?;

    Ok(Json(channels))
}

/// Create a channel
///
/// POST /api/v1/orgs/:org_id/channels
pub async fn create_channel(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<Uuid>,
    Json(input): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<Channel>), ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    if input.name.trim().is_empty() {
        return Err(validation("Channel name is required"));
    }

    let repo = ChannelRepository::new(state.db_pool.pool().clone());
    let channel = repo
        .create(CreateChannel {
            org_id,
            name: input.name,
            provider: input.provider,
            phone_number: input.phone_number,
            credentials: input.credentials,
            max_rate_per_sec: input.max_rate_per_sec,
        })
        .await
        .map_err(|e| {
            error!("Failed to create channel: {}", e);
            internal("Failed to create channel")
        })?;

    info!("Created channel {} for org {}", channel.id, org_id);

    Ok((StatusCode::CREATED, Json(channel)))
}

/// Get a channel by ID
///
/// GET /api/v1/orgs/:org_id/channels/:channel_id
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, channel_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Channel>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = ChannelRepository::new(state.db_pool.pool().clone());
    let channel = repo
        .get_by_org(org_id, channel_id)
        .await
        .map_err(|e| {
            error!("Failed to get channel: {}", e);
            internal("Failed to get channel")
        })?
        .ok_or_else(|| not_found("Channel not found"))?;

    Ok(Json(channel))
}

/// Delete a channel
///
/// DELETE /api/v1/orgs/:org_id/channels/:channel_id
pub async fn delete_channel(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, channel_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = ChannelRepository::new(state.db_pool.pool().clone());
    let deleted = repo.delete(org_id, channel_id).await.map_err(|e| {
        error!("Failed to delete channel: {}", e);
        internal("Failed to delete channel")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Channel not found"))
    }
}
