//! API routes

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{campaigns, channels, contacts, drips, health, webhooks};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Webhook ingress (signature-verified, no API key)
    let webhook_routes = Router::new()
        .route("/status", post(webhooks::receive_status))
        .with_state(state.clone());

    // Channel routes
    let channel_routes = Router::new()
        .route("/", get(channels::list_channels))
        .route("/", post(channels::create_channel))
        .route("/:channel_id", get(channels::get_channel))
        .route("/:channel_id", delete(channels::delete_channel));

    // Contact routes
    let contact_routes = Router::new()
        .route("/", get(contacts::list_contacts))
        .route("/", post(contacts::create_contact))
        .route("/:contact_id", get(contacts::get_contact))
        .route("/:contact_id", delete(contacts::delete_contact))
        .route("/:contact_id/opt-in", patch(contacts::set_opt_in));

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id", put(campaigns::update_campaign))
        .route("/:campaign_id", delete(campaigns::delete_campaign))
        .route("/:campaign_id/execute", post(campaigns::execute_campaign))
        .route("/:campaign_id/stats", get(campaigns::get_campaign_stats))
        .route("/:campaign_id/recipients", get(campaigns::list_recipients))
        .route("/:campaign_id/recipients", post(campaigns::add_recipients))
        .route(
            "/:campaign_id/recipients",
            delete(campaigns::remove_recipients),
        );

    // Drip sequence routes
    let drip_routes = Router::new()
        .route("/", get(drips::list_sequences))
        .route("/", post(drips::create_sequence))
        .route("/:sequence_id", get(drips::get_sequence))
        .route("/:sequence_id/steps", post(drips::add_step))
        .route("/:sequence_id/activate", post(drips::activate_sequence))
        .route("/:sequence_id/deactivate", post(drips::deactivate_sequence))
        .route("/:sequence_id/enrollments", get(drips::list_enrollments))
        .route("/:sequence_id/enrollments", post(drips::enroll_contact))
        .route(
            "/:sequence_id/enrollments/:enrollment_id",
            delete(drips::cancel_enrollment),
        );

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .nest("/orgs/:org_id/channels", channel_routes)
        .nest("/orgs/:org_id/contacts", contact_routes)
        .nest("/orgs/:org_id/campaigns", campaign_routes)
        .nest("/orgs/:org_id/drip-sequences", drip_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Combine all routes
    Router::new()
        .nest("/health", health_routes)
        .nest("/webhooks", webhook_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}
