//! Destinations for exported statistics.

use hwsync_hal::TableStat;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::counter::CounterSnapshot;

/// Receives table usage and counter values for external export.
pub trait MetricsSink: Send + Sync {
    fn publish_table_stat(&self, stat: &TableStat);

    fn export_counter(&self, snapshot: &CounterSnapshot);
}

/// Writes every metric to the log.
#[derive(Debug, Default)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn publish_table_stat(&self, stat: &TableStat) {
        debug!(
            "table {}: used={} free={} capacity={}",
            stat.name,
            stat.used,
            stat.free(),
            stat.capacity
        );
    }

    fn export_counter(&self, snapshot: &CounterSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(json) => info!("counter {}", json),
            Err(e) => debug!("counter {} not serializable: {}", snapshot.name, e),
        }
    }
}

/// Keeps the latest value of every metric in memory.
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    tables: Mutex<BTreeMap<String, TableStat>>,
    counters: Mutex<BTreeMap<String, CounterSnapshot>>,
    publish_count: Mutex<usize>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<TableStat> {
        self.tables.lock().get(name).cloned()
    }

    pub fn counter(&self, name: &str) -> Option<CounterSnapshot> {
        self.counters.lock().get(name).cloned()
    }

    pub fn counter_names(&self) -> Vec<String> {
        self.counters.lock().keys().cloned().collect()
    }

    /// Number of table stats published so far.
    pub fn publish_count(&self) -> usize {
        *self.publish_count.lock()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn publish_table_stat(&self, stat: &TableStat) {
        self.tables.lock().insert(stat.name.clone(), stat.clone());
        *self.publish_count.lock() += 1;
    }

    fn export_counter(&self, snapshot: &CounterSnapshot) {
        self.counters
            .lock()
            .insert(snapshot.name.clone(), snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_sink_keeps_latest() {
        let sink = MemoryMetricsSink::new();
        sink.publish_table_stat(&TableStat::new("lpm_ipv4", 1, 10));
        sink.publish_table_stat(&TableStat::new("lpm_ipv4", 2, 10));

        assert_eq!(sink.table("lpm_ipv4").unwrap().used, 2);
        assert_eq!(sink.publish_count(), 2);
        assert!(sink.table("lpm_ipv6").is_none());
    }

    #[test]
    fn test_log_sink_accepts_everything() {
        let sink = LogMetricsSink;
        sink.publish_table_stat(&TableStat::new("acl_entries", 0, 0));
        sink.export_counter(&CounterSnapshot {
            name: "acl1.packets".to_string(),
            sum: 0,
            rate: 0.0,
            last_value: None,
            last_updated: None,
        });
    }
}
