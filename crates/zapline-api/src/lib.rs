//! Zapline API - REST surface for campaign and drip management
//!
//! Tenant-scoped routes live under `/api/v1/orgs/:org_id/...` behind the
//! API-key middleware; webhook ingress and health checks are open.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{AppState, AuthContext};
pub use routes::create_router;
