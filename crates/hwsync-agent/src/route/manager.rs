//! RouteManager: declarative routes to hardware route entries.
//!
//! Every route with resolved next hops is bound to a shared next-hop group.
//! Groups are created on first use, reference counted by the routes bound to
//! them, and destroyed when the last route goes away. DROP and TO_CPU routes
//! never touch the group table.

use hwsync_common::SyncMapError;
use hwsync_hal::{AsicCapability, HwError, NextHopGroupOid, RouteEntryOid, RouteTarget, VendorBackend};
use hwsync_types::{Route, RouteNextHopEntry, RouterId};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use super::nhg::{NextHopGroupEntry, NextHopGroupKey, NextHopGroupTable};
use super::types::{RouteEntry, RouteKey};

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route already exists: {0}")]
    DuplicateRoute(RouteKey),

    #[error("route not found: {0}")]
    RouteNotFound(RouteKey),

    #[error("next-hop group table full ({0} groups)")]
    NextHopGroupTableFull(usize),

    #[error("next-hop group {key} reference count: {source}")]
    RefCount {
        key: String,
        #[source]
        source: SyncMapError,
    },

    #[error(transparent)]
    Hardware(#[from] HwError),
}

pub type Result<T> = std::result::Result<T, RouteError>;

#[derive(Debug, Clone)]
pub struct RouteManagerConfig {
    /// Upper bound on live next-hop groups, orphans included.
    pub max_next_hop_groups: usize,
    /// Look for existing hardware objects before creating new ones.
    pub use_object_key_cache: bool,
}

impl RouteManagerConfig {
    pub fn from_capability(capability: &AsicCapability) -> Self {
        Self {
            max_next_hop_groups: capability.max_next_hop_groups as usize,
            use_object_key_cache: capability.needs_object_key_cache,
        }
    }
}

impl Default for RouteManagerConfig {
    fn default() -> Self {
        Self {
            max_next_hop_groups: 1024,
            use_object_key_cache: false,
        }
    }
}

/// A group whose hardware removal failed. It still occupies a slot in the
/// hardware table until a retry succeeds.
#[derive(Debug, Clone)]
struct OrphanedGroup {
    key: NextHopGroupKey,
    oid: NextHopGroupOid,
}

pub struct RouteManager {
    config: RouteManagerConfig,
    backend: Arc<dyn VendorBackend>,
    routes: HashMap<RouteKey, RouteEntry>,
    groups: NextHopGroupTable,
    orphaned_groups: Vec<OrphanedGroup>,
}

impl RouteManager {
    pub fn new(backend: Arc<dyn VendorBackend>) -> Self {
        let config = RouteManagerConfig::from_capability(backend.capability());
        Self::with_config(backend, config)
    }

    pub fn with_config(backend: Arc<dyn VendorBackend>, config: RouteManagerConfig) -> Self {
        Self {
            config,
            backend,
            routes: HashMap::new(),
            groups: NextHopGroupTable::new(),
            orphaned_groups: Vec::new(),
        }
    }

    pub fn config(&self) -> &RouteManagerConfig {
        &self.config
    }

    /// Derives the hardware key of a declarative route.
    pub fn route_entry_from_sw_route(router_id: RouterId, route: &Route) -> RouteKey {
        RouteKey::new(router_id, route.prefix)
    }

    pub fn get_route(&self, key: &RouteKey) -> Option<&RouteEntry> {
        self.routes.get(key)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn next_hop_group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn next_hop_group_ref_count(&self, key: &NextHopGroupKey) -> Option<u32> {
        self.groups.ref_count(key)
    }

    pub fn next_hop_group_handle(&self, key: &NextHopGroupKey) -> Option<NextHopGroupOid> {
        self.groups.get(key).map(|e| e.oid())
    }

    pub fn orphaned_group_count(&self) -> usize {
        self.orphaned_groups.len()
    }

    /// Programs a route that is not yet in hardware.
    ///
    /// If programming the route entry fails, the group reference taken for it
    /// is dropped again (destroying the group if this route created it).
    pub fn add_route(&mut self, router_id: RouterId, route: &Route) -> Result<()> {
        let key = Self::route_entry_from_sw_route(router_id, route);
        if self.routes.contains_key(&key) {
            return Err(RouteError::DuplicateRoute(key));
        }

        let (target, group) = match &route.next_hop_entry {
            RouteNextHopEntry::Drop => (RouteTarget::Drop, None),
            RouteNextHopEntry::ToCpu => (RouteTarget::ToCpu, None),
            RouteNextHopEntry::NextHops(nexthops) if nexthops.is_empty() => {
                warn!("route {} has no next hops, programming DROP", key);
                (RouteTarget::Drop, None)
            }
            RouteNextHopEntry::NextHops(nexthops) => {
                let group_key = NextHopGroupKey::from(nexthops);
                let oid = self.acquire_group(&group_key)?;
                (RouteTarget::NextHopGroup(oid), Some(group_key))
            }
        };

        let handle = match self.program_route(&key, target) {
            Ok(handle) => handle,
            Err(e) => {
                error!("failed to program route {}: {}", key, e);
                if let Some(group_key) = &group {
                    self.release_group(group_key);
                }
                return Err(e);
            }
        };

        self.routes.insert(
            key,
            RouteEntry {
                handle,
                target,
                group,
                next_hop_entry: route.next_hop_entry.clone(),
            },
        );
        info!("added route {} -> {}", key, target);
        Ok(())
    }

    /// Removes a programmed route and drops its group reference.
    pub fn remove_route(&mut self, router_id: RouterId, route: &Route) -> Result<()> {
        let key = Self::route_entry_from_sw_route(router_id, route);
        let handle = self
            .routes
            .get(&key)
            .map(|entry| entry.handle)
            .ok_or(RouteError::RouteNotFound(key))?;

        self.backend.remove_route(handle)?;

        if let Some(entry) = self.routes.remove(&key) {
            if let Some(group_key) = &entry.group {
                self.release_group(group_key);
            }
        }
        info!("removed route {}", key);

        self.reap_orphaned_groups();
        Ok(())
    }

    /// Retries hardware removal of groups whose earlier removal failed.
    ///
    /// Returns the number of groups freed.
    pub fn reap_orphaned_groups(&mut self) -> usize {
        if self.orphaned_groups.is_empty() {
            return 0;
        }

        let before = self.orphaned_groups.len();
        let backend = Arc::clone(&self.backend);
        self.orphaned_groups.retain(|orphan| match backend.remove_next_hop_group(orphan.oid) {
            Ok(()) => {
                info!("reaped orphaned next-hop group {} {}", orphan.oid, orphan.key);
                false
            }
            Err(e) => {
                debug!("orphaned next-hop group {} still busy: {}", orphan.oid, e);
                true
            }
        });
        before - self.orphaned_groups.len()
    }

    /// Writes the route entry, reclaiming a stale entry left under the same
    /// key when the ASIC needs the object key cache.
    fn program_route(&self, key: &RouteKey, target: RouteTarget) -> Result<RouteEntryOid> {
        if self.config.use_object_key_cache {
            if let Some(stale) = self.backend.get_route(key.router_id, &key.prefix)? {
                warn!("reclaiming stale hardware entry {} for route {}", stale, key);
                self.backend.remove_route(stale)?;
            }
        }
        Ok(self.backend.create_route(key.router_id, &key.prefix, target)?)
    }

    /// Takes a reference on the group for `key`, creating it if needed.
    fn acquire_group(&mut self, key: &NextHopGroupKey) -> Result<NextHopGroupOid> {
        if let Some(oid) = self.groups.get(key).map(|e| e.oid()) {
            let refs = self
                .groups
                .increment_ref(key)
                .map_err(|source| RouteError::RefCount {
                    key: key.to_string(),
                    source,
                })?;
            debug!("next-hop group {} shared by {} routes", key, refs);
            return Ok(oid);
        }

        // A group still waiting for removal can simply be taken back.
        if let Some(pos) = self.orphaned_groups.iter().position(|o| &o.key == key) {
            let orphan = self.orphaned_groups.swap_remove(pos);
            info!("reusing orphaned next-hop group {} for {}", orphan.oid, key);
            self.groups.insert(key.clone(), NextHopGroupEntry::new(orphan.oid));
            return Ok(orphan.oid);
        }

        let live = self.groups.len() + self.orphaned_groups.len();
        if live >= self.config.max_next_hop_groups {
            warn!(
                "cannot create next-hop group {}: {} of {} in use",
                key, live, self.config.max_next_hop_groups
            );
            return Err(RouteError::NextHopGroupTableFull(self.config.max_next_hop_groups));
        }

        let members = key.members();
        let existing = if self.config.use_object_key_cache {
            self.backend.get_next_hop_group(&members)?
        } else {
            None
        };
        let oid = match existing {
            Some(oid) => {
                info!("adopting existing hardware next-hop group {} for {}", oid, key);
                oid
            }
            None => {
                let oid = self.backend.create_next_hop_group(&members)?;
                info!("created next-hop group {} for {}", oid, key);
                oid
            }
        };

        self.groups.insert(key.clone(), NextHopGroupEntry::new(oid));
        Ok(oid)
    }

    /// Drops a reference on the group for `key` and destroys the hardware
    /// group with the last one. A failed destroy parks the group as orphaned.
    fn release_group(&mut self, key: &NextHopGroupKey) {
        let released = match self.groups.release(key) {
            Ok(released) => released,
            Err(e) => {
                error!("inconsistent reference count for next-hop group {}: {}", key, e);
                return;
            }
        };

        let Some(entry) = released else {
            return;
        };

        match self.backend.remove_next_hop_group(entry.oid()) {
            Ok(()) => info!("removed next-hop group {} {}", entry.oid(), key),
            Err(e) => {
                warn!(
                    "failed to remove next-hop group {} {}, will retry: {}",
                    entry.oid(),
                    key,
                    e
                );
                self.orphaned_groups.push(OrphanedGroup {
                    key: key.clone(),
                    oid: entry.oid(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwsync_hal::{AsicFamily, FakeBackend, FakeOp, HwStatus};
    use hwsync_types::{InterfaceId, IpPrefix, ResolvedNextHop};
    use pretty_assertions::assert_eq;

    fn nh(addr: &str, intf: u32) -> ResolvedNextHop {
        ResolvedNextHop::new(addr.parse().unwrap(), InterfaceId::new(intf), 1)
    }

    fn route(prefix: &str, hops: &[ResolvedNextHop]) -> Route {
        Route::new(
            prefix.parse().unwrap(),
            RouteNextHopEntry::from_next_hops(hops.iter().cloned()),
        )
    }

    fn setup() -> (Arc<FakeBackend>, RouteManager) {
        let backend = Arc::new(FakeBackend::default());
        let manager = RouteManager::new(backend.clone());
        (backend, manager)
    }

    const R0: RouterId = RouterId::new(0);

    #[test]
    fn test_add_route() {
        let (backend, mut manager) = setup();
        let r = route("10.0.0.0/24", &[nh("10.1.1.1", 1), nh("10.1.1.2", 2)]);

        manager.add_route(R0, &r).unwrap();

        let key = RouteManager::route_entry_from_sw_route(R0, &r);
        let entry = manager.get_route(&key).unwrap();
        let group = NextHopGroupKey::from_next_hops([nh("10.1.1.1", 1), nh("10.1.1.2", 2)]);
        assert_eq!(entry.group.as_ref(), Some(&group));
        assert_eq!(manager.next_hop_group_ref_count(&group), Some(1));
        assert_eq!(backend.route_count(), 1);
        assert_eq!(backend.next_hop_group_count(), 1);
    }

    #[test]
    fn test_single_next_hop_uses_group() {
        let (backend, mut manager) = setup();
        manager.add_route(R0, &route("10.0.0.0/24", &[nh("10.1.1.1", 1)])).unwrap();
        assert_eq!(manager.next_hop_group_count(), 1);
        assert_eq!(backend.next_hop_group_count(), 1);
    }

    #[test]
    fn test_terminal_routes_skip_groups() {
        let (backend, mut manager) = setup();
        let to_cpu = Route::new("10.0.0.0/24".parse().unwrap(), RouteNextHopEntry::ToCpu);
        let drop = Route::new("10.0.1.0/24".parse().unwrap(), RouteNextHopEntry::Drop);

        manager.add_route(R0, &to_cpu).unwrap();
        manager.add_route(R0, &drop).unwrap();

        assert_eq!(manager.next_hop_group_count(), 0);
        assert_eq!(backend.next_hop_group_count(), 0);
        assert_eq!(
            backend.route_target(R0, &to_cpu.prefix),
            Some(RouteTarget::ToCpu)
        );
        assert_eq!(backend.route_target(R0, &drop.prefix), Some(RouteTarget::Drop));
        assert!(manager
            .get_route(&RouteKey::new(R0, drop.prefix))
            .unwrap()
            .is_terminal());
    }

    #[test]
    fn test_empty_next_hops_program_drop() {
        let (backend, mut manager) = setup();
        let r = route("10.0.0.0/24", &[]);
        manager.add_route(R0, &r).unwrap();
        assert_eq!(backend.route_target(R0, &r.prefix), Some(RouteTarget::Drop));
        assert_eq!(manager.next_hop_group_count(), 0);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let (backend, mut manager) = setup();
        let r = route("10.0.0.0/24", &[nh("10.1.1.1", 1)]);
        manager.add_route(R0, &r).unwrap();

        let err = manager.add_route(R0, &r).unwrap_err();
        assert!(matches!(err, RouteError::DuplicateRoute(_)));
        assert_eq!(backend.route_count(), 1);
        let group = NextHopGroupKey::from_next_hops([nh("10.1.1.1", 1)]);
        assert_eq!(manager.next_hop_group_ref_count(&group), Some(1));
    }

    #[test]
    fn test_host_bits_do_not_create_second_route() {
        let (_backend, mut manager) = setup();
        manager.add_route(R0, &route("10.0.0.0/24", &[nh("10.1.1.1", 1)])).unwrap();
        let err = manager
            .add_route(R0, &route("10.0.0.5/24", &[nh("10.1.1.1", 1)]))
            .unwrap_err();
        assert!(matches!(err, RouteError::DuplicateRoute(_)));
    }

    #[test]
    fn test_remove_missing_route() {
        let (_backend, mut manager) = setup();
        let err = manager
            .remove_route(R0, &route("10.9.0.0/16", &[nh("10.1.1.1", 1)]))
            .unwrap_err();
        assert!(matches!(err, RouteError::RouteNotFound(_)));
        assert_eq!(manager.route_count(), 0);
    }

    #[test]
    fn test_get_missing_route_is_none() {
        let (_backend, manager) = setup();
        let key = RouteKey::new(R0, "10.0.0.0/24".parse::<IpPrefix>().unwrap());
        assert!(manager.get_route(&key).is_none());
    }

    #[test]
    fn test_rollback_destroys_new_group() {
        let (backend, mut manager) = setup();
        backend.fail_next(FakeOp::CreateRoute, HwStatus::TableFull);

        let err = manager
            .add_route(R0, &route("10.0.0.0/24", &[nh("10.1.1.1", 1)]))
            .unwrap_err();
        assert!(matches!(err, RouteError::Hardware(_)));
        assert_eq!(manager.route_count(), 0);
        assert_eq!(manager.next_hop_group_count(), 0);
        assert_eq!(backend.next_hop_group_count(), 0);
    }

    #[test]
    fn test_rollback_keeps_shared_group() {
        let (backend, mut manager) = setup();
        let hops = [nh("10.1.1.1", 1), nh("10.1.1.2", 2)];
        manager.add_route(R0, &route("10.0.0.0/24", &hops)).unwrap();

        backend.fail_next(FakeOp::CreateRoute, HwStatus::Failure);
        assert!(manager.add_route(R0, &route("10.0.1.0/24", &hops)).is_err());

        let group = NextHopGroupKey::from_next_hops(hops);
        assert_eq!(manager.next_hop_group_ref_count(&group), Some(1));
        assert_eq!(backend.next_hop_group_count(), 1);
    }

    #[test]
    fn test_orphaned_group_reaped_later() {
        let (backend, mut manager) = setup();
        backend.fail_next(FakeOp::CreateRoute, HwStatus::Failure);
        backend.fail_next(FakeOp::RemoveNextHopGroup, HwStatus::ObjectInUse);

        assert!(manager
            .add_route(R0, &route("10.0.0.0/24", &[nh("10.1.1.1", 1)]))
            .is_err());
        assert_eq!(manager.orphaned_group_count(), 1);
        assert_eq!(backend.next_hop_group_count(), 1);

        assert_eq!(manager.reap_orphaned_groups(), 1);
        assert_eq!(manager.orphaned_group_count(), 0);
        assert_eq!(backend.next_hop_group_count(), 0);
    }

    #[test]
    fn test_orphaned_group_taken_back() {
        let (backend, mut manager) = setup();
        let hops = [nh("10.1.1.1", 1)];
        backend.fail_next(FakeOp::CreateRoute, HwStatus::Failure);
        backend.fail_next(FakeOp::RemoveNextHopGroup, HwStatus::Failure);
        assert!(manager.add_route(R0, &route("10.0.0.0/24", &hops)).is_err());
        assert_eq!(manager.orphaned_group_count(), 1);

        manager.add_route(R0, &route("10.0.0.0/24", &hops)).unwrap();
        assert_eq!(manager.orphaned_group_count(), 0);
        assert_eq!(backend.next_hop_group_count(), 1);
        assert_eq!(
            manager.next_hop_group_ref_count(&NextHopGroupKey::from_next_hops(hops)),
            Some(1)
        );
    }

    #[test]
    fn test_group_table_full() {
        let backend = Arc::new(FakeBackend::default());
        let config = RouteManagerConfig {
            max_next_hop_groups: 1,
            use_object_key_cache: false,
        };
        let mut manager = RouteManager::with_config(backend.clone(), config);

        manager.add_route(R0, &route("10.0.0.0/24", &[nh("10.1.1.1", 1)])).unwrap();
        let err = manager
            .add_route(R0, &route("10.0.1.0/24", &[nh("10.1.1.2", 2)]))
            .unwrap_err();
        assert!(matches!(err, RouteError::NextHopGroupTableFull(1)));
        assert_eq!(backend.next_hop_group_count(), 1);

        // Sharing the existing group needs no new slot.
        manager.add_route(R0, &route("10.0.2.0/24", &[nh("10.1.1.1", 1)])).unwrap();
    }

    #[test]
    fn test_object_key_cache_adopts_existing_group() {
        let backend = Arc::new(FakeBackend::new(AsicFamily::Trident2));
        let hops = [nh("10.1.1.1", 1), nh("10.1.1.2", 2)];
        let key = NextHopGroupKey::from_next_hops(hops.clone());
        let existing = backend.preload_next_hop_group(&key.members()).unwrap();

        let mut manager = RouteManager::new(backend.clone());
        assert!(manager.config().use_object_key_cache);
        manager.add_route(R0, &route("10.0.0.0/24", &hops)).unwrap();

        assert_eq!(manager.next_hop_group_handle(&key), Some(existing));
        assert_eq!(backend.next_hop_group_count(), 1);
    }

    #[test]
    fn test_object_key_cache_reclaims_stale_route() {
        let backend = Arc::new(FakeBackend::new(AsicFamily::Tomahawk));
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        backend.preload_route(R0, prefix, RouteTarget::ToCpu).unwrap();

        let mut manager = RouteManager::new(backend.clone());
        manager
            .add_route(R0, &Route::new(prefix, RouteNextHopEntry::Drop))
            .unwrap();

        assert_eq!(backend.route_count(), 1);
        assert_eq!(backend.route_target(R0, &prefix), Some(RouteTarget::Drop));
    }

    #[test]
    fn test_without_key_cache_stale_route_conflicts() {
        let backend = Arc::new(FakeBackend::default());
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        backend.preload_route(R0, prefix, RouteTarget::ToCpu).unwrap();

        let mut manager = RouteManager::new(backend.clone());
        let err = manager
            .add_route(R0, &Route::new(prefix, RouteNextHopEntry::Drop))
            .unwrap_err();
        match err {
            RouteError::Hardware(e) => assert_eq!(e.status(), HwStatus::ItemAlreadyExists),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_failed_hardware_remove_keeps_route() {
        let (backend, mut manager) = setup();
        let r = route("10.0.0.0/24", &[nh("10.1.1.1", 1)]);
        manager.add_route(R0, &r).unwrap();

        backend.fail_next(FakeOp::RemoveRoute, HwStatus::Failure);
        assert!(manager.remove_route(R0, &r).is_err());
        assert_eq!(manager.route_count(), 1);
        assert_eq!(manager.next_hop_group_count(), 1);

        manager.remove_route(R0, &r).unwrap();
        assert_eq!(backend.next_hop_group_count(), 0);
    }
}
