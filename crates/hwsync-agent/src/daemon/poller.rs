//! Periodic counter collection.

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::stats::StatUpdater;

#[derive(Debug, Clone)]
pub struct StatsPollerConfig {
    /// Time between two counter collections.
    pub interval: Duration,
    /// Export SUM and RATE of every counter after each collection.
    pub export_counters: bool,
}

impl Default for StatsPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            export_counters: true,
        }
    }
}

/// Calls [`StatUpdater::update_stats`] on a fixed interval until shut down.
pub struct StatsPoller {
    config: StatsPollerConfig,
    stats: Arc<StatUpdater>,
}

impl StatsPoller {
    pub fn new(stats: Arc<StatUpdater>, config: StatsPollerConfig) -> Self {
        Self { config, stats }
    }

    /// Runs until `shutdown` becomes true or its sender is dropped. Returns
    /// the number of completed polls.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = 0u64;

        info!("stats poller started, interval {:?}", self.config.interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let updated = self.stats.update_stats();
                    if self.config.export_counters {
                        self.stats.export_counters();
                    }
                    polls += 1;
                    debug!("poll {}: {} counters updated", polls, updated);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("stats poller stopped after {} polls", polls);
        polls
    }

    /// Spawns the poller on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }
}
