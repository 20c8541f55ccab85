//! Campaign dispatch - rate governance, recipient claiming, and the
//! execution engine driving campaign runs.

mod cursor;
mod engine;
mod governor;
mod runner;

pub use cursor::RecipientCursor;
pub use engine::{CampaignEngine, EngineError};
pub use governor::RateGovernor;
pub use runner::{CampaignRunner, RunnerReport};

/// Effective pacing for a campaign on a channel: the requested rate,
/// clamped to the supported range and capped by the channel's provider
/// ceiling.
pub fn effective_rate(campaign_rate: i32, channel_ceiling: i32) -> u32 {
    campaign_rate.clamp(1, 10).min(channel_ceiling.max(1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_effective_rate_caps_at_channel_ceiling() {
        assert_eq!(effective_rate(10, 3), 3);
        assert_eq!(effective_rate(2, 10), 2);
        assert_eq!(effective_rate(50, 80), 10);
        assert_eq!(effective_rate(0, 0), 1);
    }
}
