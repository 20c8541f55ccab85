//! Campaign runner - periodic tick that starts scheduled campaigns and
//! re-enters interrupted runs.
//!
//! Restart recovery relies on the engine's idempotent `execute`: a
//! campaign left `running` by a dead process is simply re-entered, and the
//! recipient claim keeps re-entry from double-sending. Recipients a dead
//! process left claimed are released back to pending after a grace period.

use serde::Serialize;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use zapline_storage::db::DatabasePool;
use zapline_storage::repository::{CampaignRecipientRepository, CampaignRepository};

use crate::dispatch::CampaignEngine;

/// Claimed rows older than this are treated as abandoned by a dead worker
const STALE_CLAIM_MINUTES: i32 = 10;

/// What one runner tick did, for observability
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunnerReport {
    pub started: usize,
    pub reentered: usize,
    pub released_stale: u64,
    pub errors: usize,
}

/// Periodic campaign runner
pub struct CampaignRunner {
    engine: CampaignEngine,
    campaigns: CampaignRepository,
    recipients: CampaignRecipientRepository,
    interval_secs: u64,
}

impl CampaignRunner {
    /// Create a new campaign runner
    pub fn new(db_pool: DatabasePool, engine: CampaignEngine, interval_secs: u64) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            engine,
            campaigns: CampaignRepository::new(pool.clone()),
            recipients: CampaignRecipientRepository::new(pool),
            interval_secs,
        }
    }

    /// Run the periodic loop
    pub async fn run(&self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs.max(1)));

        info!("Campaign runner started (every {}s)", self.interval_secs);

        loop {
            ticker.tick().await;

            match self.tick().await {
                Ok(report) => {
                    if report.started > 0 || report.reentered > 0 || report.released_stale > 0 {
                        info!(
                            started = report.started,
                            reentered = report.reentered,
                            released_stale = report.released_stale,
                            errors = report.errors,
                            "Runner tick"
                        );
                    }
                }
                Err(e) => error!("Runner tick failed: {}", e),
            }
        }
    }

    /// One tick: release abandoned claims, start due scheduled campaigns,
    /// re-enter running campaigns with unsettled recipients.
    pub async fn tick(&self) -> anyhow::Result<RunnerReport> {
        let mut report = RunnerReport::default();

        report.released_stale = self
            .recipients
            .release_stale_sending(STALE_CLAIM_MINUTES)
            .await?;
        if report.released_stale > 0 {
            warn!(
                count = report.released_stale,
                "Released recipients abandoned in flight"
            );
        }

        for campaign in self.campaigns.get_scheduled_ready().await? {
            match self.engine.execute(campaign.org_id, campaign.id).await {
                Ok(_) => {
                    info!(campaign_id = %campaign.id, "Scheduled campaign started");
                    report.started += 1;
                }
                Err(e) => {
                    // contained per campaign; a broken one must not stall the rest
                    warn!(campaign_id = %campaign.id, "Failed to start scheduled campaign: {}", e);
                    report.errors += 1;
                }
            }
        }

        for campaign in self.campaigns.get_running_with_unsettled().await? {
            if self.engine.is_active(campaign.id).await {
                continue;
            }
            match self.engine.execute(campaign.org_id, campaign.id).await {
                Ok(_) => report.reentered += 1,
                Err(e) => {
                    warn!(campaign_id = %campaign.id, "Failed to re-enter campaign: {}", e);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }
}
