//! StatUpdater: ACL counter lifecycle and periodic statistics collection.
//!
//! Counter additions and removals are staged by the apply path and only take
//! effect on the next [`StatUpdater::refresh`], so the poller never observes a
//! half-applied configuration. Staged counters stay invisible to lookups
//! until then.

use chrono::{DateTime, Utc};
use hwsync_hal::{AclStatHandle, HwError, TableStat, VendorBackend};
use hwsync_types::{AclCounterConfig, CounterType, PortId, StateDelta};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::counter::{CounterSnapshot, MonotonicCounter, DEFAULT_RATE_WINDOW};
use super::sink::MetricsSink;
use super::store::{AclCounterDescriptor, CounterStore};
use super::table_stats::{TableStatConfig, TableStatManager};

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    #[error("counter {name} already registered for {descriptor}")]
    DuplicateCounter {
        descriptor: AclCounterDescriptor,
        name: String,
    },

    #[error("unsupported counter type: {0}")]
    UnsupportedCounterType(String),

    #[error(transparent)]
    Hardware(#[from] HwError),
}

pub type Result<T> = std::result::Result<T, StatError>;

#[derive(Debug, Clone)]
pub struct StatUpdaterConfig {
    /// Samples kept per counter for RATE.
    pub rate_window: usize,
    pub table_stats: TableStatConfig,
}

impl Default for StatUpdaterConfig {
    fn default() -> Self {
        Self {
            rate_window: DEFAULT_RATE_WINDOW,
            table_stats: TableStatConfig::default(),
        }
    }
}

#[derive(Debug, Default)]
struct PendingChanges {
    removals: VecDeque<AclStatHandle>,
    additions: VecDeque<(AclCounterDescriptor, String)>,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }
}

/// Name under which one counter of an ACL stat is exported.
pub fn counter_name(stat_name: &str, counter_type: CounterType) -> String {
    format!("{}.{}", stat_name, counter_type.as_str())
}

/// Validates the counter types configured on an ACL.
pub fn parse_counter_types(config: &AclCounterConfig) -> Result<Vec<CounterType>> {
    config
        .counter_types()
        .map_err(|e| StatError::UnsupportedCounterType(e.to_string()))
}

pub struct StatUpdater {
    config: StatUpdaterConfig,
    backend: Arc<dyn VendorBackend>,
    counters: CounterStore,
    table_stats: TableStatManager,
    pending: Mutex<PendingChanges>,
    sink: Arc<dyn MetricsSink>,
}

impl StatUpdater {
    pub fn new(backend: Arc<dyn VendorBackend>, sink: Arc<dyn MetricsSink>) -> Self {
        Self::with_config(backend, sink, StatUpdaterConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn VendorBackend>,
        sink: Arc<dyn MetricsSink>,
        config: StatUpdaterConfig,
    ) -> Self {
        let table_stats = TableStatManager::new(Arc::clone(&backend), config.table_stats.clone());
        Self {
            config,
            backend,
            counters: CounterStore::new(),
            table_stats,
            pending: Mutex::new(PendingChanges::default()),
            sink,
        }
    }

    /// Stages one counter per type of `handle`, named `<name>.<type>`.
    pub fn to_be_added_acl_stat(&self, handle: AclStatHandle, name: &str, types: &[CounterType]) {
        let mut pending = self.pending.lock();
        for &counter_type in types {
            let descriptor = AclCounterDescriptor::new(handle, counter_type);
            debug!("staging counter {} for {}", counter_name(name, counter_type), descriptor);
            pending
                .additions
                .push_back((descriptor, counter_name(name, counter_type)));
        }
    }

    /// Stages removal of every counter of `handle`.
    pub fn to_be_removed_acl_stat(&self, handle: AclStatHandle) {
        debug!("staging removal of counters for {}", handle);
        self.pending.lock().removals.push_back(handle);
    }

    /// Recomputes table usage from `delta` and applies staged counter changes.
    ///
    /// Removals are applied before additions, so removing and re-adding a
    /// handle in the same batch replaces its counters. On
    /// [`StatError::DuplicateCounter`] the colliding addition is dropped and
    /// the ones staged after it stay queued.
    pub fn refresh(&self, delta: &StateDelta) -> Result<()> {
        self.table_stats.refresh(delta)?;

        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }

        let mut counters = self.counters.write();
        while let Some(handle) = pending.removals.pop_front() {
            let removed = counters.remove_handle(handle);
            if removed == 0 {
                warn!("no counters registered for {}", handle);
            } else {
                info!("removed {} counters for {}", removed, handle);
            }
        }

        while let Some((descriptor, name)) = pending.additions.pop_front() {
            if counters.contains(&descriptor) {
                error!("counter {} already registered for {}", name, descriptor);
                return Err(StatError::DuplicateCounter { descriptor, name });
            }
            counters.insert(
                descriptor,
                MonotonicCounter::with_window(name.clone(), self.config.rate_window),
            );
            info!("added counter {} for {}", name, descriptor);
        }

        Ok(())
    }

    /// Samples every active counter at the current time and publishes table
    /// usage. Returns the number of counters updated.
    pub fn update_stats(&self) -> usize {
        self.update_stats_at(Utc::now())
    }

    pub fn update_stats_at(&self, now: DateTime<Utc>) -> usize {
        let mut updated = 0;
        self.counters.for_each(|descriptor, counter| {
            match self
                .backend
                .get_acl_stat(descriptor.handle, descriptor.counter_type)
            {
                Ok(value) => {
                    counter.update_value(now, value);
                    updated += 1;
                }
                Err(e) => warn!("failed to read {} ({}): {}", counter.name(), descriptor, e),
            }
        });

        self.table_stats.publish(self.sink.as_ref());
        updated
    }

    /// Sends the SUM and RATE of every active counter to the metrics sink.
    pub fn export_counters(&self) {
        self.counters
            .for_each(|_, counter| self.sink.export_counter(&counter.snapshot()));
    }

    pub fn get_counter_if(
        &self,
        handle: AclStatHandle,
        counter_type: CounterType,
    ) -> Option<Arc<MonotonicCounter>> {
        self.counters
            .get(&AclCounterDescriptor::new(handle, counter_type))
    }

    pub fn get_counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Counters staged for addition but not yet registered.
    pub fn pending_addition_count(&self) -> usize {
        self.pending.lock().additions.len()
    }

    pub fn pending_removal_count(&self) -> usize {
        self.pending.lock().removals.len()
    }

    pub fn counter_snapshots(&self) -> Vec<CounterSnapshot> {
        self.counters.snapshots()
    }

    pub fn table_stats(&self) -> Vec<TableStat> {
        self.table_stats.snapshot()
    }

    /// Resets hardware counters of `ports` in order, stopping at the first
    /// failure. Returns how many ports were cleared.
    pub fn clear_port_stats(&self, ports: &[PortId]) -> usize {
        let mut cleared = 0;
        for &port in ports {
            if let Err(e) = self.backend.clear_port_stats(port) {
                error!("failed to clear stats of {}: {}", port, e);
                return cleared;
            }
            debug!("cleared stats of {}", port);
            cleared += 1;
        }
        cleared
    }
}
