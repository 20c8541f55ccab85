//! Rate governor - per-channel send pacing
//!
//! Each channel has a lane holding the next free send instant. Acquiring a
//! slot reserves that instant and pushes the lane forward by one interval;
//! the caller then sleeps until its reservation outside the lock. The lock
//! is held only for the reservation, never across a network call, and
//! tokio's mutex wakes waiters FIFO, so concurrent campaign runs sharing a
//! channel are served fairly.
//!
//! State is in-memory only. A fresh process starts with fresh lanes, which
//! is sound: the invariant is "never exceed the rate", not "count sends
//! since boot".

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use zapline_common::types::ChannelId;

/// Per-channel token-paced rate limiter
pub struct RateGovernor {
    lanes: Mutex<HashMap<ChannelId, Lane>>,
}

struct Lane {
    next_slot: Instant,
}

impl RateGovernor {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until the channel has a free send slot at `per_sec` pacing.
    ///
    /// Returns immediately when the lane is idle; otherwise suspends the
    /// caller until its reserved instant. Other channels are unaffected.
    pub async fn acquire(&self, channel_id: ChannelId, per_sec: u32) {
        let interval = Duration::from_secs_f64(1.0 / per_sec.max(1) as f64);

        let slot = {
            let mut lanes = self.lanes.lock().await;
            let now = Instant::now();
            let lane = lanes.entry(channel_id).or_insert(Lane { next_slot: now });

            if lane.next_slot < now {
                lane.next_slot = now;
            }

            let slot = lane.next_slot;
            lane.next_slot = slot + interval;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }

    /// Push a channel's lane forward after a provider backoff signal, so
    /// the next acquisitions wait out the penalty.
    pub async fn backoff(&self, channel_id: ChannelId, penalty: Duration) {
        let mut lanes = self.lanes.lock().await;
        let now = Instant::now();
        let lane = lanes.entry(channel_id).or_insert(Lane { next_slot: now });
        let penalized = now + penalty;

        if lane.next_slot < penalized {
            lane.next_slot = penalized;
        }
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn test_paces_to_configured_rate() {
        let governor = RateGovernor::new();
        let channel = Uuid::new_v4();
        let started = Instant::now();

        // 5 sends at 2/s occupy slots at 0, 500, 1000, 1500, 2000 ms
        for _ in 0..5 {
            governor.acquire(channel, 2).await;
        }

        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let governor = RateGovernor::new();
        let started = Instant::now();

        governor.acquire(Uuid::new_v4(), 1).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_do_not_interfere() {
        let governor = RateGovernor::new();
        let busy = Uuid::new_v4();
        let quiet = Uuid::new_v4();

        // saturate one channel
        for _ in 0..3 {
            governor.acquire(busy, 1).await;
        }

        let started = Instant::now();
        governor.acquire(quiet, 1).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_campaigns_share_the_ceiling() {
        let governor = Arc::new(RateGovernor::new());
        let channel = Uuid::new_v4();
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();

        // two campaign runs, three sends each, one shared 1/s channel
        let mut handles = Vec::new();
        for _ in 0..2 {
            let governor = governor.clone();
            let stamps = stamps.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..3 {
                    governor.acquire(channel, 1).await;
                    stamps.lock().await.push(started.elapsed());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut stamps = stamps.lock().await.clone();
        stamps.sort();
        assert_eq!(stamps.len(), 6);

        // every 1-second window holds at most one send
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_next_slot() {
        let governor = RateGovernor::new();
        let channel = Uuid::new_v4();

        governor.acquire(channel, 10).await;
        governor.backoff(channel, Duration::from_secs(3)).await;

        let started = Instant::now();
        governor.acquire(channel, 10).await;
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
