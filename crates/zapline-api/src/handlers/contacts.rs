//! Contact handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;
use zapline_common::types::PhoneNumber;
use zapline_storage::models::{Contact, CreateContact};
use zapline_storage::repository::ContactRepository;

use crate::auth::{require_org_access, AppState, AuthContext};
use crate::handlers::{forbidden, internal, not_found, validation, ApiError};

/// Query parameters for listing contacts
#[derive(Debug, Deserialize)]
pub struct ListContactsQuery {
    #[serde(default)]
    pub opted_in: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Request body for creating a contact
#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub phone: String,
    pub name: Option<String>,
    pub is_opted_in: Option<bool>,
    pub attributes: Option<serde_json::Value>,
}

/// Request body for the opt-in flag
#[derive(Debug, Deserialize)]
pub struct OptInRequest {
    pub is_opted_in: bool,
}

/// List contacts for an organization
///
/// GET /api/v1/orgs/:org_id/contacts
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListContactsQuery>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = ContactRepository::new(state.db_pool.pool().clone());
    let contacts = repo
        .list_by_org(org_id, query.opted_in, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list contacts: {}", e);
            internal("Failed to list contacts")
        })?;

    Ok(Json(contacts))
}

/// Create a contact
///
/// POST /api/v1/orgs/:org_id/contacts
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(org_id): Path<Uuid>,
    Json(input): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let phone = PhoneNumber::parse(&input.phone)
        .ok_or_else(|| validation("Invalid phone number"))?;

    let repo = ContactRepository::new(state.db_pool.pool().clone());
    let contact = repo
        .create(CreateContact {
            org_id,
            phone: phone.to_string(),
            name: input.name,
            is_opted_in: input.is_opted_in,
            attributes: input.attributes,
        })
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                return (
                    StatusCode::CONFLICT,
                    Json(crate::handlers::ErrorResponse::new(
                        "duplicate",
                        "A contact with this phone number already exists",
                    )),
                );
            }
            error!("Failed to create contact: {}", e);
            internal("Failed to create contact")
        })?;

    info!("Created contact {} for org {}", contact.id, org_id);

    Ok((StatusCode::CREATED, Json(contact)))
}

/// Get a contact by ID
///
/// GET /api/v1/orgs/:org_id/contacts/:contact_id
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, contact_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Contact>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = ContactRepository::new(state.db_pool.pool().clone());
    let contact = repo
        .get_by_org(org_id, contact_id)
        .await
        .map_err(|e| {
            error!("Failed to get contact: {}", e);
            internal("Failed to get contact")
        })?
        .ok_or_else(|| not_found("Contact not found"))?;

    Ok(Json(contact))
}

/// Set the opt-in flag
///
/// PATCH /api/v1/orgs/:org_id/contacts/:contact_id/opt-in
pub async fn set_opt_in(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, contact_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<OptInRequest>,
) -> Result<Json<Contact>, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = ContactRepository::new(state.db_pool.pool().clone());
    let contact = repo
        .set_opted_in(org_id, contact_id, input.is_opted_in)
        .await
        .map_err(|e| {
            error!("Failed to update contact: {}", e);
            internal("Failed to update contact")
        })?
        .ok_or_else(|| not_found("Contact not found"))?;

    info!(
        "Contact {} opt-in set to {}",
        contact_id, input.is_opted_in
    );

    Ok(Json(contact))
}

/// Delete a contact
///
/// DELETE /api/v1/orgs/:org_id/contacts/:contact_id
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((org_id, contact_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_org_access(&auth, org_id).map_err(forbidden)?;

    let repo = ContactRepository::new(state.db_pool.pool().clone());
    let deleted = repo.delete(org_id, contact_id).await.map_err(|e| {
        error!("Failed to delete contact: {}", e);
        internal("Failed to delete contact")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Contact not found"))
    }
}
