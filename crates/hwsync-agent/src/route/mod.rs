//! Route synchronization.
//!
//! [`RouteManager`] turns declarative route additions and removals into
//! hardware route entries and shared next-hop groups.

mod manager;
mod nhg;
mod types;

pub use manager::{RouteError, RouteManager, RouteManagerConfig};
pub use nhg::{NextHopGroupEntry, NextHopGroupKey, NextHopGroupTable};
pub use types::{RouteEntry, RouteKey};
