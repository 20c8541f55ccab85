//! Drip sequences - time-delayed per-contact message series

mod scheduler;

pub use scheduler::{first_due_at, next_due_after, DripScheduler, SweepReport};
