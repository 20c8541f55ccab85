//! Campaign handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;
use zapline_common::types::MessagePayload;
use zapline_core::EngineError;
use zapline_storage::models::{
    Campaign, CampaignStats, CampaignStatus, CreateCampaign, RecipientStatus, UpdateCampaign,
};
use zapline_storage::repository::{
    CampaignRecipientRepository, CampaignRepository, ChannelRepository,
};

use crate::auth::{require_org_access, AppState, AuthContext};
use crate::handlers::{forbidden, internal, not_found, validation, ApiError, ErrorResponse};

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Campaign list response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<CampaignResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Campaign response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub name: String,
    pub payload: serde_json::Value,
    pub rate_per_sec: i32,
    pub status: String,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub failed_count: i32,
    pub progress_percentage: f64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        let progress = c.progress_percentage();
        Self {
            id: c.id,
            channel_id: c.channel_id,
            name: c.name,
            payload: c.payload,
            rate_per_sec: c.rate_per_sec,
            status: c.status,
            total_recipients: c.total_recipients,
            sent_count: c.sent_count,
            delivered_count: c.delivered_count,
            failed_count: c.failed_count,
            progress_percentage: progress,
            scheduled_at: c.scheduled_at,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub channel_id: Uuid,
    pub name: String,
    pub payload: MessagePayload,
    pub rate_per_sec: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// Request body for updating a campaign
#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub payload: Option<MessagePayload>,
    pub rate_per_sec: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// Lifecycle action applied through the execute endpoint
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteAction {
    Start,
    Pause,
    Resume,
    Cancel,
}

/// Request body for the execute endpoint
#[derive(Debug, Deserialize)]
pub struct ExecuteCampaignRequest {
    pub action: ExecuteAction,
}

/// Request body for adding or removing recipients
#[derive(Debug, Deserialize)]
pub struct RecipientSelection {
    pub contact_ids: Vec<Uuid>,
}

/// Response for recipient mutations
#[derive(Debug, Serialize)]
pub struct RecipientMutationResponse {
    pub requested: usize,
    pub affected: u64,
}

fn engine_error(e: EngineError) -> ApiError {
    match e {
        EngineError::NotFound => not_found("Campaign not found"),
        EngineError::InvalidStateTransition(from) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "invalid_state_transition",
                format!("Action not allowed while campaign is '{}'", from),
            )),
        ),
        EngineError::ChannelConfig(message) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new("channel_config", message)),
        ),
        EngineError::DripStep => validation("Drip steps are dispatched by the drip scheduler"),
        EngineError::Database(e) => {
            error!("Campaign engine storage error: {}", e);
            internal("Storage failure")
        }
    }
}

/// List campaigns for an organization
///
/// GET /api/v1/orgs/:org_id/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<CampaignListResponse>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let status = query.status.and_then(|s| s.parse::<CampaignStatus>().ok());

    let campaigns = repo
        .list_by_org(org_id, status, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list campaigns: {}", e);
            internal("Failed to list campaigns")
        })?;

    let total = repo.count_by_org(org_id, status).await.unwrap_or(0);
    let data = campaigns.into_iter().map(CampaignResponse::from).collect();

    Ok(Json(CampaignListResponse {
        data,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Create a new campaign
///
/// POST /api/v1/orgs/:org_id/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<Uuid>,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    if input.name.trim().is_empty() {
        return Err(validation("Campaign name is required"));
    }

    // the channel must exist and belong to this organization
    let channels = ChannelRepository::new(state.db_pool.pool().clone());
    channels
        .get_by_org(org_id, input.channel_id)
        .await
        .map_err(|e| {
            error!("Failed to look up channel: {}", e);
            internal("Failed to look up channel")
        })?
        .ok_or_else(|| validation("Channel not found in this organization"))?;

    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let campaign = repo
        .create(CreateCampaign {
            org_id,
            channel_id: input.channel_id,
            name: input.name,
            payload: input.payload,
            rate_per_sec: input.rate_per_sec,
            scheduled_at: input.scheduled_at,
            drip_sequence_id: None,
            step_order: None,
            delay_minutes: None,
            metadata: input.metadata,
        })
        .await
        .map_err(|e| {
            error!("Failed to create campaign: {}", e);
            internal("Failed to create campaign")
        })?;

    info!("Created campaign {} for org {}", campaign.id, org_id);

    Ok((StatusCode::CREATED, Json(CampaignResponse::from(campaign))))
}

/// Get a campaign by ID
///
/// GET /api/v1/orgs/:org_id/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, campaign_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CampaignResponse>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let campaign = repo
        .get_by_org(org_id, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal("Failed to get campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Update a draft campaign
///
/// PUT /api/v1/orgs/:org_id/campaigns/:campaign_id
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, campaign_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateCampaignRequest>,
) -> Result<Json<CampaignResponse>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let campaign = repo
        .update(
            org_id,
            campaign_id,
            UpdateCampaign {
                name: input.name,
                payload: input.payload,
                rate_per_sec: input.rate_per_sec,
                scheduled_at: input.scheduled_at,
                metadata: input.metadata,
            },
        )
        .await
        .map_err(|e| {
            error!("Failed to update campaign: {}", e);
            internal("Failed to update campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found or not in draft status"))?;

    info!("Updated campaign {}", campaign_id);

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Delete a campaign (refused while running)
///
/// DELETE /api/v1/orgs/:org_id/campaigns/:campaign_id
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, campaign_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let deleted = repo.delete(org_id, campaign_id).await.map_err(|e| {
        error!("Failed to delete campaign: {}", e);
        internal("Failed to delete campaign")
    })?;

    if deleted {
        info!("Deleted campaign {}", campaign_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Campaign not found or currently running"))
    }
}

/// Apply a lifecycle action: start, pause, resume, or cancel.
/// Returns the post-action stats snapshot.
///
/// POST /api/v1/orgs/:org_id/campaigns/:campaign_id/execute
pub async fn execute_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, campaign_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<ExecuteCampaignRequest>,
) -> Result<Json<CampaignStats>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let result = match input.action {
        ExecuteAction::Start => state.engine.execute(org_id, campaign_id).await,
        ExecuteAction::Pause => state.engine.pause(org_id, campaign_id).await,
        ExecuteAction::Resume => state.engine.resume(org_id, campaign_id).await,
        ExecuteAction::Cancel => state.engine.cancel(org_id, campaign_id).await,
    };

    let stats = result.map_err(engine_error)?;

    info!(
        "Campaign {} action {:?} applied (status {})",
        campaign_id, input.action, stats.status
    );

    Ok(Json(stats))
}

/// Get campaign statistics
///
/// GET /api/v1/orgs/:org_id/campaigns/:campaign_id/stats
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, campaign_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CampaignStats>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let stats = state
        .engine
        .stats(org_id, campaign_id)
        .await
        .map_err(engine_error)?;

    Ok(Json(stats))
}

/// List recipients of a campaign
///
/// GET /api/v1/orgs/:org_id/campaigns/:campaign_id/recipients
pub async fn list_recipients(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, campaign_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ListRecipientsQuery>,
) -> Result<Json<Vec<zapline_storage::models::CampaignRecipient>>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = CampaignRecipientRepository::new(state.db_pool.pool().clone());
    let status = query.status.and_then(|s| s.parse::<RecipientStatus>().ok());

    let recipients = repo
        .list_by_campaign(org_id, campaign_id, status, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list recipients: {}", e);
            internal("Failed to list recipients")
        })?;

    Ok(Json(recipients))
}

/// Query parameters for listing recipients
#[derive(Debug, Deserialize)]
pub struct ListRecipientsQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Attach contacts to a draft campaign.
///
/// Opt-in is re-checked here: contacts with `is_opted_in = false` are
/// excluded even when explicitly requested, and duplicates are no-ops.
///
/// POST /api/v1/orgs/:org_id/campaigns/:campaign_id/recipients
pub async fn add_recipients(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, campaign_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<RecipientSelection>,
) -> Result<Json<RecipientMutationResponse>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    if input.contact_ids.is_empty() {
        return Err(validation("contact_ids must not be empty"));
    }

    let campaign = require_draft_campaign(&state, org_id, campaign_id).await?;

    let repo = CampaignRecipientRepository::new(state.db_pool.pool().clone());
    let affected = repo
        .add_contacts(
            org_id,
            campaign.id,
            &input.contact_ids,
            state.dispatch.max_attempts,
        )
        .await
        .map_err(|e| {
            error!("Failed to add recipients: {}", e);
            internal("Failed to add recipients")
        })?;

    info!(
        "Added {} of {} requested recipients to campaign {}",
        affected,
        input.contact_ids.len(),
        campaign_id
    );

    Ok(Json(RecipientMutationResponse {
        requested: input.contact_ids.len(),
        affected,
    }))
}

/// Remove contacts from a draft campaign
///
/// DELETE /api/v1/orgs/:org_id/campaigns/:campaign_id/recipients
pub async fn remove_recipients(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, campaign_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<RecipientSelection>,
) -> Result<Json<RecipientMutationResponse>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let campaign = require_draft_campaign(&state, org_id, campaign_id).await?;

    let repo = CampaignRecipientRepository::new(state.db_pool.pool().clone());
    let affected = repo
        .remove_contacts(org_id, campaign.id, &input.contact_ids)
        .await
        .map_err(|e| {
            error!("Failed to remove recipients: {}", e);
            internal("Failed to remove recipients")
        })?;

    Ok(Json(RecipientMutationResponse {
        requested: input.contact_ids.len(),
        affected,
    }))
}

/// Recipient mutations are only allowed while the campaign is a draft
async fn require_draft_campaign(
    state: &AppState,
    org_id: Uuid,
    campaign_id: Uuid,
) -> Result<Campaign, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    let campaign = repo
        .get_by_org(org_id, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal("Failed to get campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    if campaign.status_enum() != Some(CampaignStatus::Draft) {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "invalid_state_transition",
                "Recipient list can only change while the campaign is a draft",
            )),
        ));
    }

    Ok(campaign)
}
