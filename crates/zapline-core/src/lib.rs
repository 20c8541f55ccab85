//! Zapline Core - Outbound message delivery
//!
//! This crate provides the delivery machinery of Zapline: transport
//! adapters over the messaging providers, the per-channel rate governor,
//! the campaign execution engine with its claim-based recipient cursor,
//! the drip scheduler, and the delivery status reconciler.

pub mod dispatch;
pub mod drip;
pub mod status;
pub mod transport;

pub use dispatch::{CampaignEngine, CampaignRunner, EngineError, RateGovernor, RecipientCursor};
pub use drip::{DripScheduler, SweepReport};
pub use status::{ReconcileOutcome, StatusReconciler, StatusUpdate};
pub use transport::{
    CloudApiTransport, GatewayTransport, SendError, Transport, TransportResolver,
};
