//! Delivery status reconciliation from provider callbacks

mod reconciler;

pub use reconciler::{ReconcileOutcome, StatusReconciler, StatusUpdate};
