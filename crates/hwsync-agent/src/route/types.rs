//! Route keys and programmed route entries.

use hwsync_hal::{RouteEntryOid, RouteTarget};
use hwsync_types::{IpPrefix, RouteNextHopEntry, RouterId};
use std::fmt;

use super::nhg::NextHopGroupKey;

/// Identity of a route in hardware: (virtual router, network prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub router_id: RouterId,
    pub prefix: IpPrefix,
}

impl RouteKey {
    /// Host bits of `prefix` are cleared, so 10.0.0.1/24 and 10.0.0.0/24 are
    /// the same key.
    pub fn new(router_id: RouterId, prefix: IpPrefix) -> Self {
        Self {
            router_id,
            prefix: prefix.network(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.router_id, self.prefix)
    }
}

/// A route programmed in hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub handle: RouteEntryOid,
    pub target: RouteTarget,
    /// Group the route is bound to; `None` for DROP and TO_CPU.
    pub group: Option<NextHopGroupKey>,
    pub next_hop_entry: RouteNextHopEntry,
}

impl RouteEntry {
    pub fn is_terminal(&self) -> bool {
        self.group.is_none()
    }
}
