//! In-memory backend used by tests and by the daemon's simulation mode.
//!
//! Besides storing the objects it is asked to create, the fake lets tests
//! inject failures, set counter values and inspect what was programmed.

use crate::backend::{RouteTarget, VendorBackend};
use crate::capability::{AsicCapability, AsicFamily};
use crate::error::{HwError, HwResult, HwStatus};
use crate::types::{AclStatHandle, NextHopGroupOid, RawObjectId, RouteEntryOid};
use hwsync_types::{CounterType, IpPrefix, PortId, ResolvedNextHop, RouterId};
use log::debug;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Backend calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    CreateRoute,
    RemoveRoute,
    CreateNextHopGroup,
    RemoveNextHopGroup,
    CreateAclStat,
    RemoveAclStat,
    GetAclStat,
}

#[derive(Debug)]
struct FakeRoute {
    router_id: RouterId,
    prefix: IpPrefix,
    target: RouteTarget,
}

#[derive(Debug)]
struct FakeAclStat {
    name: String,
    values: BTreeMap<CounterType, u64>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_oid: RawObjectId,
    routes: HashMap<RouteEntryOid, FakeRoute>,
    route_index: HashMap<(RouterId, IpPrefix), RouteEntryOid>,
    groups: HashMap<NextHopGroupOid, Vec<ResolvedNextHop>>,
    acl_stats: HashMap<AclStatHandle, FakeAclStat>,
    cleared_ports: Vec<PortId>,
    failing_ports: HashSet<PortId>,
    injected: HashMap<FakeOp, HwStatus>,
}

impl FakeState {
    fn allocate(&mut self) -> RawObjectId {
        self.next_oid += 1;
        self.next_oid
    }

    /// Consumes a one-shot failure armed for `op`.
    fn check(&mut self, op: FakeOp) -> HwResult<()> {
        match self.injected.remove(&op) {
            Some(status) => Err(HwError::new(status, format!("injected failure on {:?}", op))),
            None => Ok(()),
        }
    }

    fn group_in_use(&self, group: NextHopGroupOid) -> bool {
        self.routes
            .values()
            .any(|r| r.target == RouteTarget::NextHopGroup(group))
    }
}

pub struct FakeBackend {
    capability: AsicCapability,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(family: AsicFamily) -> Self {
        Self::with_capability(family.capability().clone())
    }

    pub fn with_capability(capability: AsicCapability) -> Self {
        Self {
            capability,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Makes the next call of `op` fail with `status`.
    pub fn fail_next(&self, op: FakeOp, status: HwStatus) {
        self.state.lock().injected.insert(op, status);
    }

    /// Makes every clear of `port` fail until [`FakeBackend::heal_port`].
    pub fn fail_port_clear(&self, port: PortId) {
        self.state.lock().failing_ports.insert(port);
    }

    pub fn heal_port(&self, port: PortId) {
        self.state.lock().failing_ports.remove(&port);
    }

    /// Sets the live value the hardware reports for one counter.
    pub fn set_acl_stat_value(
        &self,
        handle: AclStatHandle,
        counter_type: CounterType,
        value: u64,
    ) -> HwResult<()> {
        let mut state = self.state.lock();
        let stat = state
            .acl_stats
            .get_mut(&handle)
            .ok_or_else(|| HwError::not_found(handle))?;
        match stat.values.get_mut(&counter_type) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(HwError::new(
                HwStatus::NotSupported,
                format!("{} has no {} counter", handle, counter_type),
            )),
        }
    }

    /// Installs a group as if it survived from a previous run.
    pub fn preload_next_hop_group(&self, members: &[ResolvedNextHop]) -> HwResult<NextHopGroupOid> {
        let mut state = self.state.lock();
        let raw = state.allocate();
        let oid = NextHopGroupOid::from_raw(raw)
            .ok_or_else(|| HwError::new(HwStatus::Failure, "handle allocator wrapped"))?;
        state.groups.insert(oid, members.to_vec());
        Ok(oid)
    }

    /// Installs a route entry as if it survived from a previous run.
    pub fn preload_route(
        &self,
        router_id: RouterId,
        prefix: IpPrefix,
        target: RouteTarget,
    ) -> HwResult<RouteEntryOid> {
        let mut state = self.state.lock();
        let raw = state.allocate();
        let oid = RouteEntryOid::from_raw(raw)
            .ok_or_else(|| HwError::new(HwStatus::Failure, "handle allocator wrapped"))?;
        state.route_index.insert((router_id, prefix), oid);
        state.routes.insert(
            oid,
            FakeRoute {
                router_id,
                prefix,
                target,
            },
        );
        Ok(oid)
    }

    pub fn route_count(&self) -> usize {
        self.state.lock().routes.len()
    }

    pub fn next_hop_group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    pub fn acl_stat_count(&self) -> usize {
        self.state.lock().acl_stats.len()
    }

    pub fn route_target(&self, router_id: RouterId, prefix: &IpPrefix) -> Option<RouteTarget> {
        let state = self.state.lock();
        let oid = state.route_index.get(&(router_id, *prefix))?;
        state.routes.get(oid).map(|r| r.target)
    }

    pub fn next_hop_group_members(&self, group: NextHopGroupOid) -> Option<Vec<ResolvedNextHop>> {
        self.state.lock().groups.get(&group).cloned()
    }

    pub fn acl_stat_name(&self, handle: AclStatHandle) -> Option<String> {
        self.state.lock().acl_stats.get(&handle).map(|s| s.name.clone())
    }

    /// Ports cleared successfully, in call order.
    pub fn cleared_ports(&self) -> Vec<PortId> {
        self.state.lock().cleared_ports.clone()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new(AsicFamily::Fake)
    }
}

impl VendorBackend for FakeBackend {
    fn capability(&self) -> &AsicCapability {
        &self.capability
    }

    fn create_route(
        &self,
        router_id: RouterId,
        prefix: &IpPrefix,
        target: RouteTarget,
    ) -> HwResult<RouteEntryOid> {
        let mut state = self.state.lock();
        state.check(FakeOp::CreateRoute)?;

        if state.route_index.contains_key(&(router_id, *prefix)) {
            return Err(HwError::already_exists(format!("route {} {}", router_id, prefix)));
        }
        if let RouteTarget::NextHopGroup(group) = target {
            if !state.groups.contains_key(&group) {
                return Err(HwError::new(
                    HwStatus::InvalidObjectId,
                    format!("route {} points at unknown {}", prefix, group),
                ));
            }
        }

        let raw = state.allocate();
        let oid = RouteEntryOid::from_raw(raw)
            .ok_or_else(|| HwError::new(HwStatus::Failure, "handle allocator wrapped"))?;
        state.route_index.insert((router_id, *prefix), oid);
        state.routes.insert(
            oid,
            FakeRoute {
                router_id,
                prefix: *prefix,
                target,
            },
        );
        debug!("fake: created route {} {} -> {}", router_id, prefix, target);
        Ok(oid)
    }

    fn remove_route(&self, route: RouteEntryOid) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(FakeOp::RemoveRoute)?;

        let removed = state
            .routes
            .remove(&route)
            .ok_or_else(|| HwError::not_found(route))?;
        state
            .route_index
            .remove(&(removed.router_id, removed.prefix));
        debug!("fake: removed route {} {}", removed.router_id, removed.prefix);
        Ok(())
    }

    fn get_route(&self, router_id: RouterId, prefix: &IpPrefix) -> HwResult<Option<RouteEntryOid>> {
        Ok(self.state.lock().route_index.get(&(router_id, *prefix)).copied())
    }

    fn create_next_hop_group(&self, members: &[ResolvedNextHop]) -> HwResult<NextHopGroupOid> {
        let mut state = self.state.lock();
        state.check(FakeOp::CreateNextHopGroup)?;

        if members.is_empty() {
            return Err(HwError::new(
                HwStatus::InvalidParameter,
                "next-hop group needs at least one member",
            ));
        }
        if state.groups.len() >= self.capability.max_next_hop_groups as usize {
            return Err(HwError::new(HwStatus::TableFull, "next-hop group table"));
        }

        let raw = state.allocate();
        let oid = NextHopGroupOid::from_raw(raw)
            .ok_or_else(|| HwError::new(HwStatus::Failure, "handle allocator wrapped"))?;
        state.groups.insert(oid, members.to_vec());
        debug!("fake: created {} with {} members", oid, members.len());
        Ok(oid)
    }

    fn remove_next_hop_group(&self, group: NextHopGroupOid) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(FakeOp::RemoveNextHopGroup)?;

        if !state.groups.contains_key(&group) {
            return Err(HwError::not_found(group));
        }
        if state.group_in_use(group) {
            return Err(HwError::new(
                HwStatus::ObjectInUse,
                format!("{} still referenced by a route", group),
            ));
        }
        state.groups.remove(&group);
        debug!("fake: removed {}", group);
        Ok(())
    }

    fn get_next_hop_group(&self, members: &[ResolvedNextHop]) -> HwResult<Option<NextHopGroupOid>> {
        let state = self.state.lock();
        Ok(state
            .groups
            .iter()
            .find(|(_, existing)| existing.as_slice() == members)
            .map(|(oid, _)| *oid))
    }

    fn create_acl_stat(&self, name: &str, types: &[CounterType]) -> HwResult<AclStatHandle> {
        let mut state = self.state.lock();
        state.check(FakeOp::CreateAclStat)?;

        let counters: usize = state.acl_stats.values().map(|s| s.values.len()).sum();
        if counters + types.len() > self.capability.max_acl_counters as usize {
            return Err(HwError::new(HwStatus::TableFull, "acl counter table"));
        }

        let raw = state.allocate();
        let handle = AclStatHandle::from_raw(raw)
            .ok_or_else(|| HwError::new(HwStatus::Failure, "handle allocator wrapped"))?;
        state.acl_stats.insert(
            handle,
            FakeAclStat {
                name: name.to_string(),
                values: types.iter().map(|t| (*t, 0)).collect(),
            },
        );
        debug!("fake: created {} for {}", handle, name);
        Ok(handle)
    }

    fn remove_acl_stat(&self, handle: AclStatHandle) -> HwResult<()> {
        let mut state = self.state.lock();
        state.check(FakeOp::RemoveAclStat)?;

        state
            .acl_stats
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| HwError::not_found(handle))
    }

    fn get_acl_stat(&self, handle: AclStatHandle, counter_type: CounterType) -> HwResult<u64> {
        let mut state = self.state.lock();
        state.check(FakeOp::GetAclStat)?;

        let stat = state
            .acl_stats
            .get(&handle)
            .ok_or_else(|| HwError::not_found(handle))?;
        stat.values.get(&counter_type).copied().ok_or_else(|| {
            HwError::new(
                HwStatus::NotSupported,
                format!("{} has no {} counter", handle, counter_type),
            )
        })
    }

    fn clear_port_stats(&self, port: PortId) -> HwResult<()> {
        let mut state = self.state.lock();
        if state.failing_ports.contains(&port) {
            return Err(HwError::new(
                HwStatus::Failure,
                format!("failed to clear counters of {}", port),
            ));
        }
        state.cleared_ports.push(port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwsync_types::InterfaceId;
    use pretty_assertions::assert_eq;

    fn hops(addrs: &[&str]) -> Vec<ResolvedNextHop> {
        addrs
            .iter()
            .enumerate()
            .map(|(i, a)| ResolvedNextHop::new(a.parse().unwrap(), InterfaceId::new(i as u32), 1))
            .collect()
    }

    #[test]
    fn test_route_lifecycle() {
        let backend = FakeBackend::default();
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        let router = RouterId::new(0);

        let oid = backend.create_route(router, &prefix, RouteTarget::Drop).unwrap();
        assert_eq!(backend.get_route(router, &prefix).unwrap(), Some(oid));
        assert_eq!(backend.route_target(router, &prefix), Some(RouteTarget::Drop));

        let dup = backend.create_route(router, &prefix, RouteTarget::ToCpu).unwrap_err();
        assert_eq!(dup.status(), HwStatus::ItemAlreadyExists);

        backend.remove_route(oid).unwrap();
        assert_eq!(backend.route_count(), 0);
        assert_eq!(backend.get_route(router, &prefix).unwrap(), None);
    }

    #[test]
    fn test_group_in_use_cannot_be_removed() {
        let backend = FakeBackend::default();
        let group = backend
            .create_next_hop_group(&hops(&["1.1.1.1", "2.2.2.2"]))
            .unwrap();
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        let route = backend
            .create_route(RouterId::new(0), &prefix, RouteTarget::NextHopGroup(group))
            .unwrap();

        let err = backend.remove_next_hop_group(group).unwrap_err();
        assert_eq!(err.status(), HwStatus::ObjectInUse);

        backend.remove_route(route).unwrap();
        backend.remove_next_hop_group(group).unwrap();
        assert_eq!(backend.next_hop_group_count(), 0);
    }

    #[test]
    fn test_get_next_hop_group_matches_members() {
        let backend = FakeBackend::default();
        let members = hops(&["1.1.1.1", "2.2.2.2"]);
        let group = backend.preload_next_hop_group(&members).unwrap();

        assert_eq!(backend.get_next_hop_group(&members).unwrap(), Some(group));
        assert_eq!(backend.get_next_hop_group(&hops(&["1.1.1.1"])).unwrap(), None);
    }

    #[test]
    fn test_group_table_full() {
        let mut capability = AsicFamily::Fake.capability().clone();
        capability.max_next_hop_groups = 1;
        let backend = FakeBackend::with_capability(capability);

        backend.create_next_hop_group(&hops(&["1.1.1.1"])).unwrap();
        let err = backend.create_next_hop_group(&hops(&["2.2.2.2"])).unwrap_err();
        assert_eq!(err.status(), HwStatus::TableFull);
    }

    #[test]
    fn test_acl_stat_values() {
        let backend = FakeBackend::default();
        let handle = backend.create_acl_stat("acl1", &[CounterType::Packets]).unwrap();
        assert_eq!(backend.get_acl_stat(handle, CounterType::Packets).unwrap(), 0);

        backend.set_acl_stat_value(handle, CounterType::Packets, 42).unwrap();
        assert_eq!(backend.get_acl_stat(handle, CounterType::Packets).unwrap(), 42);

        let err = backend.get_acl_stat(handle, CounterType::Bytes).unwrap_err();
        assert_eq!(err.status(), HwStatus::NotSupported);

        backend.remove_acl_stat(handle).unwrap();
        assert!(backend.get_acl_stat(handle, CounterType::Packets).is_err());
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let backend = FakeBackend::default();
        backend.fail_next(FakeOp::CreateAclStat, HwStatus::NoMemory);

        let err = backend.create_acl_stat("acl1", &CounterType::ALL).unwrap_err();
        assert_eq!(err.status(), HwStatus::NoMemory);
        assert!(backend.create_acl_stat("acl1", &CounterType::ALL).is_ok());
    }

    #[test]
    fn test_port_clear_failure() {
        let backend = FakeBackend::default();
        backend.fail_port_clear(PortId::new(2));

        backend.clear_port_stats(PortId::new(1)).unwrap();
        assert!(backend.clear_port_stats(PortId::new(2)).is_err());
        backend.heal_port(PortId::new(2));
        backend.clear_port_stats(PortId::new(2)).unwrap();

        assert_eq!(backend.cleared_ports(), vec![PortId::new(1), PortId::new(2)]);
    }
}
