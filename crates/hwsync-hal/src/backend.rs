//! The per-ASIC-family backend interface.

use crate::capability::AsicCapability;
use crate::error::HwResult;
use crate::types::{AclStatHandle, NextHopGroupOid, RouteEntryOid};
use hwsync_types::{CounterType, IpPrefix, PortId, ResolvedNextHop, RouterId, StateDelta, SwitchState};
use std::fmt;

/// Where a hardware route entry sends matching packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteTarget {
    NextHopGroup(NextHopGroupOid),
    Drop,
    ToCpu,
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::NextHopGroup(group) => write!(f, "{}", group),
            RouteTarget::Drop => f.write_str("DROP"),
            RouteTarget::ToCpu => f.write_str("TO_CPU"),
        }
    }
}

/// Usage of one fixed-capacity hardware table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStat {
    pub name: String,
    pub used: u64,
    pub capacity: u64,
}

impl TableStat {
    pub fn new(name: impl Into<String>, used: u64, capacity: u64) -> Self {
        Self {
            name: name.into(),
            used,
            capacity,
        }
    }

    pub fn free(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

/// Hardware object manager for one ASIC family.
///
/// Calls are synchronous. Implementations keep only the objects they were
/// told to create; ownership of object lifetimes stays with the caller.
pub trait VendorBackend: Send + Sync {
    fn capability(&self) -> &AsicCapability;

    fn create_route(
        &self,
        router_id: RouterId,
        prefix: &IpPrefix,
        target: RouteTarget,
    ) -> HwResult<RouteEntryOid>;

    fn remove_route(&self, route: RouteEntryOid) -> HwResult<()>;

    /// Looks up a route entry already present in hardware.
    fn get_route(&self, router_id: RouterId, prefix: &IpPrefix) -> HwResult<Option<RouteEntryOid>>;

    /// `members` is sorted and free of duplicates.
    fn create_next_hop_group(&self, members: &[ResolvedNextHop]) -> HwResult<NextHopGroupOid>;

    fn remove_next_hop_group(&self, group: NextHopGroupOid) -> HwResult<()>;

    /// Looks up a group with exactly these members already present in hardware.
    fn get_next_hop_group(&self, members: &[ResolvedNextHop]) -> HwResult<Option<NextHopGroupOid>>;

    fn create_acl_stat(&self, name: &str, types: &[CounterType]) -> HwResult<AclStatHandle>;

    fn remove_acl_stat(&self, handle: AclStatHandle) -> HwResult<()>;

    /// Reads the live cumulative value of one ACL counter.
    fn get_acl_stat(&self, handle: AclStatHandle, counter_type: CounterType) -> HwResult<u64>;

    fn clear_port_stats(&self, port: PortId) -> HwResult<()>;

    /// Materializes table usage for the state a delta transitions to.
    ///
    /// The default derives usage from the declarative state; backends that
    /// can query the SDK for real occupancy override it.
    fn table_stats(&self, delta: &StateDelta) -> HwResult<Vec<TableStat>> {
        Ok(derive_table_stats(self.capability(), delta.new_state()))
    }
}

/// Table usage implied by a switch state on an ASIC with `capability`.
///
/// With ALPM enabled both address families draw from a single LPM table.
pub fn derive_table_stats(capability: &AsicCapability, state: &SwitchState) -> Vec<TableStat> {
    let (v4_routes, v6_routes) = state.route_count_by_family();
    let mut stats = Vec::with_capacity(5);

    if capability.alpm_enabled {
        stats.push(TableStat::new(
            "lpm",
            (v4_routes + v6_routes) as u64,
            u64::from(capability.max_ipv4_routes),
        ));
    } else {
        stats.push(TableStat::new(
            "lpm_ipv4",
            v4_routes as u64,
            u64::from(capability.max_ipv4_routes),
        ));
        stats.push(TableStat::new(
            "lpm_ipv6",
            v6_routes as u64,
            u64::from(capability.max_ipv6_routes),
        ));
    }

    stats.push(TableStat::new(
        "next_hop_groups",
        state.distinct_next_hop_sets().len() as u64,
        u64::from(capability.max_next_hop_groups),
    ));
    stats.push(TableStat::new(
        "acl_entries",
        state.acls.len() as u64,
        u64::from(capability.max_acl_entries),
    ));
    let acl_counters: usize = state
        .acls
        .values()
        .filter_map(|acl| acl.counter.as_ref())
        .map(|counter| counter.types.len())
        .sum();
    stats.push(TableStat::new(
        "acl_counters",
        acl_counters as u64,
        u64::from(capability.max_acl_counters),
    ));

    stats
}
