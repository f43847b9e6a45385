//! Hardware synchronization agent.
//!
//! Reconciles a declarative switch state against an ASIC through a
//! [`hwsync_hal::VendorBackend`]:
//!
//! - [`route`]: routes and shared next-hop groups
//! - [`stats`]: ACL counters, table usage and metrics export
//! - [`switch`]: the apply loop feeding state deltas to both
//! - [`daemon`]: the stats poller and state file loader used by `hwsyncd`

pub mod daemon;
pub mod route;
pub mod stats;
pub mod switch;

pub use route::{RouteError, RouteManager, RouteManagerConfig};
pub use stats::{MetricsSink, StatError, StatUpdater, StatUpdaterConfig};
pub use switch::{ApplySummary, HwSwitch, SwitchError};
