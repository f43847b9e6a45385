//! Counter and table-usage synchronization.
//!
//! [`StatUpdater`] owns the registry of live ACL counters and the hardware
//! table usage snapshot. The apply path stages counter changes and calls
//! `refresh`; the poller calls `update_stats` on a timer.

mod counter;
mod sink;
mod store;
mod table_stats;
mod updater;

pub use counter::{CounterSnapshot, MonotonicCounter, DEFAULT_RATE_WINDOW};
pub use sink::{LogMetricsSink, MemoryMetricsSink, MetricsSink};
pub use store::{AclCounterDescriptor, CounterStore, CounterStoreWriter};
pub use table_stats::{TableStatConfig, TableStatCounters, TableStatManager};
pub use updater::{
    counter_name, parse_counter_types, StatError, StatUpdater, StatUpdaterConfig,
};
