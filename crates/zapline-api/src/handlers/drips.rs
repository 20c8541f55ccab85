//! Drip sequence and enrollment handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;
use zapline_common::types::MessagePayload;
use zapline_core::drip::first_due_at;
use zapline_storage::models::{
    Campaign, CreateCampaign, CreateDripSequence, DripEnrollment, DripSequence,
};
use zapline_storage::repository::{
    CampaignRepository, ChannelRepository, ContactRepository, DripEnrollmentRepository,
    DripSequenceRepository,
};

use crate::auth::{require_org_access, AppState, AuthContext};
use crate::handlers::{forbidden, internal, not_found, validation, ApiError, ErrorResponse};

/// Pagination query
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Request body for creating a sequence
#[derive(Debug, Deserialize)]
pub struct CreateSequenceRequest {
    pub channel_id: Uuid,
    pub name: String,
}

/// Request body for appending a step
#[derive(Debug, Deserialize)]
pub struct CreateStepRequest {
    pub name: Option<String>,
    pub payload: MessagePayload,
    /// Minutes after the previous step; absent or zero means the step goes
    /// out on the sweep after its predecessor
    pub delay_minutes: Option<i32>,
    pub rate_per_sec: Option<i32>,
}

/// Request body for enrolling a contact
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub contact_id: Uuid,
}

/// Sequence response with its steps
#[derive(Debug, Serialize)]
pub struct SequenceResponse {
    #[serde(flatten)]
    pub sequence: DripSequence,
    pub steps: Vec<StepResponse>,
}

/// Step response
#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub id: Uuid,
    pub step_order: i32,
    pub name: String,
    pub payload: serde_json::Value,
    pub delay_minutes: Option<i32>,
    pub sent_count: i32,
}

impl From<Campaign> for StepResponse {
    fn from(c: Campaign) -> Self {
        Self {
            id: c.id,
            step_order: c.step_order.unwrap_or(0),
            name: c.name,
            payload: c.payload,
            delay_minutes: c.delay_minutes,
            sent_count: c.sent_count,
        }
    }
}

/// List sequences for an organization
///
/// GET /api/v1/orgs/:org_id/drip-sequences
pub async fn list_sequences(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<DripSequence>>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = DripSequenceRepository::new(state.db_pool.pool().clone());
    let sequences = repo
        .list_by_org(org_id, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list sequences: {}", e);
            internal("Failed to list sequences")
        })?;

    Ok(Json(sequences))
}

/// Create a sequence
///
/// POST /api/v1/orgs/:org_id/drip-sequences
pub async fn create_sequence(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<Uuid>,
    Json(input): Json<CreateSequenceRequest>,
) -> Result<(StatusCode, Json<DripSequence>), ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    if input.name.trim().is_empty() {
        return Err(validation("Sequence name is required"));
    }

    let channels = ChannelRepository::new(state.db_pool.pool().clone());
    channels
        .get_by_org(org_id, input.channel_id)
        .await
        .map_err(|e| {
            error!("Failed to look up channel: {}", e);
            internal("Failed to look up channel")
        })?
        .ok_or_else(|| validation("Channel not found in this organization"))?;

    let repo = DripSequenceRepository::new(state.db_pool.pool().clone());
    let sequence = repo
        .create(CreateDripSequence {
            org_id,
            channel_id: input.channel_id,
            name: input.name,
        })
        .await
        .map_err(|e| {
            error!("Failed to create sequence: {}", e);
            internal("Failed to create sequence")
        })?;

    info!("Created drip sequence {} for org {}", sequence.id, org_id);

    Ok((StatusCode::CREATED, Json(sequence)))
}

/// Get a sequence with its steps
///
/// GET /api/v1/orgs/:org_id/drip-sequences/:sequence_id
pub async fn get_sequence(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, sequence_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SequenceResponse>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = DripSequenceRepository::new(state.db_pool.pool().clone());
    let sequence = repo
        .get_by_org(org_id, sequence_id)
        .await
        .map_err(|e| {
            error!("Failed to get sequence: {}", e);
            internal("Failed to get sequence")
        })?
        .ok_or_else(|| not_found("Sequence not found"))?;

    let campaigns = CampaignRepository::new(state.db_pool.pool().clone());
    let steps = campaigns.list_drip_steps(sequence_id).await.map_err(|e| {
        error!("Failed to list steps: {}", e);
        internal("Failed to list steps")
    })?;

    Ok(Json(SequenceResponse {
        sequence,
        steps: steps.into_iter().map(StepResponse::from).collect(),
    }))
}

/// Append a step to a sequence. Steps are campaigns flagged with the
/// sequence id and an order; the drip scheduler dispatches them.
///
/// POST /api/v1/orgs/:org_id/drip-sequences/:sequence_id/steps
pub async fn add_step(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, sequence_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<CreateStepRequest>,
) -> Result<(StatusCode, Json<StepResponse>), ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let sequences = DripSequenceRepository::new(state.db_pool.pool().clone());
    let sequence = sequences
        .get_by_org(org_id, sequence_id)
        .await
        .map_err(|e| {
            error!("Failed to get sequence: {}", e);
            internal("Failed to get sequence")
        })?
        .ok_or_else(|| not_found("Sequence not found"))?;

    let campaigns = CampaignRepository::new(state.db_pool.pool().clone());
    let existing = campaigns.list_drip_steps(sequence_id).await.map_err(|e| {
        error!("Failed to list steps: {}", e);
        internal("Failed to list steps")
    })?;
    let step_order = existing.len() as i32 + 1;

    if let Some(delay) = input.delay_minutes {
        if delay < 0 {
            return Err(validation("delay_minutes must not be negative"));
        }
    }

    let step = campaigns
        .create(CreateCampaign {
            org_id,
            channel_id: sequence.channel_id,
            name: input
                .name
                .unwrap_or_else(|| format!("{} / step {}", sequence.name, step_order)),
            payload: input.payload,
            rate_per_sec: input.rate_per_sec,
            scheduled_at: None,
            drip_sequence_id: Some(sequence_id),
            step_order: Some(step_order),
            delay_minutes: input.delay_minutes,
            metadata: None,
        })
        .await
        .map_err(|e| {
            error!("Failed to create step: {}", e);
            internal("Failed to create step")
        })?;

    info!(
        "Added step {} to drip sequence {}",
        step_order, sequence_id
    );

    Ok((StatusCode::CREATED, Json(StepResponse::from(step))))
}

/// Activate or deactivate a sequence
///
/// POST /api/v1/orgs/:org_id/drip-sequences/:sequence_id/activate
/// POST /api/v1/orgs/:org_id/drip-sequences/:sequence_id/deactivate
pub async fn activate_sequence(
    state: State<Arc<AppState>>,
    auth: Extension<AuthContext>,
    path: Path<(Uuid, Uuid)>,
) -> Result<Json<DripSequence>, ApiError> {
    set_sequence_active(state, auth, path, true).await
}

pub async fn deactivate_sequence(
    state: State<Arc<AppState>>,
    auth: Extension<AuthContext>,
    path: Path<(Uuid, Uuid)>,
) -> Result<Json<DripSequence>, ApiError> {
    set_sequence_active(state, auth, path, false).await
}

async fn set_sequence_active(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, sequence_id)): Path<(Uuid, Uuid)>,
    active: bool,
) -> Result<Json<DripSequence>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = DripSequenceRepository::new(state.db_pool.pool().clone());
    let sequence = repo
        .set_active(org_id, sequence_id, active)
        .await
        .map_err(|e| {
            error!("Failed to update sequence: {}", e);
            internal("Failed to update sequence")
        })?
        .ok_or_else(|| not_found("Sequence not found"))?;

    info!(
        "Drip sequence {} {}",
        sequence_id,
        if active { "activated" } else { "deactivated" }
    );

    Ok(Json(sequence))
}

/// Enroll a contact into a sequence. Re-enrolling resets the existing
/// active enrollment instead of duplicating it.
///
/// POST /api/v1/orgs/:org_id/drip-sequences/:sequence_id/enrollments
pub async fn enroll_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, sequence_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<DripEnrollment>), ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let sequences = DripSequenceRepository::new(state.db_pool.pool().clone());
    sequences
        .get_by_org(org_id, sequence_id)
        .await
        .map_err(|e| {
            error!("Failed to get sequence: {}", e);
            internal("Failed to get sequence")
        })?
        .ok_or_else(|| not_found("Sequence not found"))?;

    let contacts = ContactRepository::new(state.db_pool.pool().clone());
    let contact = contacts
        .get_by_org(org_id, input.contact_id)
        .await
        .map_err(|e| {
            error!("Failed to get contact: {}", e);
            internal("Failed to get contact")
        })?
        .ok_or_else(|| validation("Contact not found in this organization"))?;

    if !contact.is_opted_in {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "not_opted_in",
                "Contact has not opted in to messaging",
            )),
        ));
    }

    let campaigns = CampaignRepository::new(state.db_pool.pool().clone());
    let first_step = campaigns.get_drip_step(sequence_id, 1).await.map_err(|e| {
        error!("Failed to get first step: {}", e);
        internal("Failed to get first step")
    })?;
    let first_due = first_due_at(chrono::Utc::now(), first_step.as_ref());

    let enrollments = DripEnrollmentRepository::new(state.db_pool.pool().clone());
    let enrollment = enrollments
        .enroll(org_id, sequence_id, input.contact_id, first_due)
        .await
        .map_err(|e| {
            error!("Failed to enroll contact: {}", e);
            internal("Failed to enroll contact")
        })?;

    info!(
        "Enrolled contact {} into drip sequence {}",
        input.contact_id, sequence_id
    );

    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// List enrollments of a sequence
///
/// GET /api/v1/orgs/:org_id/drip-sequences/:sequence_id/enrollments
pub async fn list_enrollments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, sequence_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<DripEnrollment>>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = DripEnrollmentRepository::new(state.db_pool.pool().clone());
    let enrollments = repo
        .list_by_sequence(org_id, sequence_id, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list enrollments: {}", e);
            internal("Failed to list enrollments")
        })?;

    Ok(Json(enrollments))
}

/// Cancel an active enrollment
///
/// DELETE /api/v1/orgs/:org_id/drip-sequences/:sequence_id/enrollments/:enrollment_id
pub async fn cancel_enrollment(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, _sequence_id, enrollment_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<DripEnrollment>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = DripEnrollmentRepository::new(state.db_pool.pool().clone());
    let enrollment = repo
        .cancel(org_id, enrollment_id, Some("cancelled by operator"))
        .await
        .map_err(|e| {
            error!("Failed to cancel enrollment: {}", e);
            internal("Failed to cancel enrollment")
        })?
        .ok_or_else(|| not_found("Active enrollment not found"))?;

    info!("Cancelled drip enrollment {}", enrollment_id);

    Ok(Json(enrollment))
}
