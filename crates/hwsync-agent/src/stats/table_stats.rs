//! Hardware table usage snapshots.
//!
//! The snapshot is recomputed wholesale from every state delta and published
//! to the metrics sink on every poll. Utilization crossing the high watermark
//! is logged once per crossing, and again when it drops under the low one.

use hwsync_hal::{HwResult, TableStat, VendorBackend};
use hwsync_types::StateDelta;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;

use super::sink::MetricsSink;

#[derive(Debug, Clone)]
pub struct TableStatConfig {
    /// Utilization percentage that raises a warning.
    pub high_watermark_percent: u32,
    /// Utilization percentage under which a raised warning clears.
    pub low_watermark_percent: u32,
}

impl Default for TableStatConfig {
    fn default() -> Self {
        Self {
            high_watermark_percent: 85,
            low_watermark_percent: 70,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStatCounters {
    pub refreshes: u64,
    pub publishes: u64,
    pub watermark_events: u64,
}

pub struct TableStatManager {
    config: TableStatConfig,
    backend: Arc<dyn VendorBackend>,
    snapshot: RwLock<Vec<TableStat>>,
    above_watermark: Mutex<HashSet<String>>,
    counters: Mutex<TableStatCounters>,
}

impl TableStatManager {
    pub fn new(backend: Arc<dyn VendorBackend>, config: TableStatConfig) -> Self {
        Self {
            config,
            backend,
            snapshot: RwLock::new(Vec::new()),
            above_watermark: Mutex::new(HashSet::new()),
            counters: Mutex::new(TableStatCounters::default()),
        }
    }

    /// Replaces the snapshot with the usage implied by `delta`.
    pub fn refresh(&self, delta: &StateDelta) -> HwResult<()> {
        let stats = self.backend.table_stats(delta)?;
        self.check_watermarks(&stats);
        *self.snapshot.write() = stats;
        self.counters.lock().refreshes += 1;
        Ok(())
    }

    /// Publishes the current snapshot under the read lock.
    pub fn publish(&self, sink: &dyn MetricsSink) {
        let snapshot = self.snapshot.read();
        for stat in snapshot.iter() {
            sink.publish_table_stat(stat);
        }
        self.counters.lock().publishes += 1;
    }

    pub fn snapshot(&self) -> Vec<TableStat> {
        self.snapshot.read().clone()
    }

    pub fn counters(&self) -> TableStatCounters {
        self.counters.lock().clone()
    }

    fn check_watermarks(&self, stats: &[TableStat]) {
        let mut above = self.above_watermark.lock();
        for stat in stats {
            if stat.capacity == 0 {
                continue;
            }
            let percent = stat.used.saturating_mul(100) / stat.capacity;
            if percent >= u64::from(self.config.high_watermark_percent) {
                if above.insert(stat.name.clone()) {
                    warn!(
                        "table {} at {}% ({} of {} used)",
                        stat.name, percent, stat.used, stat.capacity
                    );
                    self.counters.lock().watermark_events += 1;
                }
            } else if percent < u64::from(self.config.low_watermark_percent)
                && above.remove(&stat.name)
            {
                info!("table {} back to {}% utilization", stat.name, percent);
                self.counters.lock().watermark_events += 1;
            }
        }
    }
}
