//! HwSwitch: applies state deltas to the hardware.
//!
//! Each delta is applied in a fixed order: route removals, route additions,
//! ACL counter changes, then one [`StatUpdater::refresh`]. Hardware ACL stat
//! objects whose counters were purged are destroyed only after the refresh,
//! so the poller never reads a handle that is already gone.
//!
//! Every step is checked against what is already programmed, so a delta that
//! failed halfway can simply be applied again.

use hwsync_hal::{AclStatHandle, HwError, VendorBackend};
use hwsync_types::{AclCounterConfig, StateDelta, SwitchState};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::route::{RouteError, RouteKey, RouteManager, RouteManagerConfig};
use crate::stats::{parse_counter_types, StatError, StatUpdater};

#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("route programming failed: {0}")]
    Route(#[from] RouteError),

    #[error("counter synchronization failed: {0}")]
    Stat(#[from] StatError),

    #[error(transparent)]
    Hardware(#[from] HwError),
}

pub type Result<T> = std::result::Result<T, SwitchError>;

/// Outcome of one applied delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub routes_removed: usize,
    pub routes_added: usize,
    pub acl_stats_removed: usize,
    pub acl_stats_added: usize,
    pub groups_reaped: usize,
}

/// Hardware stat object programmed for one ACL.
#[derive(Debug, Clone)]
struct ProgrammedAclStat {
    handle: AclStatHandle,
    counter: AclCounterConfig,
}

pub struct HwSwitch {
    backend: Arc<dyn VendorBackend>,
    routes: RouteManager,
    stats: Arc<StatUpdater>,
    acl_stats: HashMap<String, ProgrammedAclStat>,
    /// Stats staged for removal whose hardware object still exists.
    retired_stats: Vec<AclStatHandle>,
    applied: Arc<SwitchState>,
}

impl HwSwitch {
    pub fn new(backend: Arc<dyn VendorBackend>, stats: Arc<StatUpdater>) -> Self {
        let config = RouteManagerConfig::from_capability(backend.capability());
        Self::with_route_config(backend, stats, config)
    }

    pub fn with_route_config(
        backend: Arc<dyn VendorBackend>,
        stats: Arc<StatUpdater>,
        config: RouteManagerConfig,
    ) -> Self {
        Self {
            routes: RouteManager::with_config(Arc::clone(&backend), config),
            backend,
            stats,
            acl_stats: HashMap::new(),
            retired_stats: Vec::new(),
            applied: Arc::new(SwitchState::default()),
        }
    }

    pub fn route_manager(&self) -> &RouteManager {
        &self.routes
    }

    pub fn stat_updater(&self) -> &Arc<StatUpdater> {
        &self.stats
    }

    /// Last state applied without error.
    pub fn applied_state(&self) -> &Arc<SwitchState> {
        &self.applied
    }

    pub fn acl_stat_handle(&self, acl: &str) -> Option<AclStatHandle> {
        self.acl_stats.get(acl).map(|stat| stat.handle)
    }

    /// Moves the hardware from the last applied state to `state`.
    pub fn apply_state(&mut self, state: Arc<SwitchState>) -> Result<ApplySummary> {
        let delta = StateDelta::new(Arc::clone(&self.applied), state);
        self.state_changed(&delta)
    }

    /// Applies `delta` and records its new side as the applied state.
    ///
    /// The first error aborts the rest of the delta and the applied state is
    /// not advanced. Operations already performed stay in hardware; applying
    /// the same target state again skips them and finishes the rest.
    pub fn state_changed(&mut self, delta: &StateDelta) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();
        let routes_delta = delta.routes_delta();

        for change in &routes_delta {
            let (router_id, prefix) = *change.key();
            let key = RouteKey::new(router_id, prefix);
            let Some(programmed) = self.routes.get_route(&key) else {
                debug!("route {} not programmed, nothing to remove", key);
                continue;
            };
            if let Some(new) = change.new_value() {
                if programmed.next_hop_entry == new.next_hop_entry {
                    continue;
                }
            }
            let Some(route) = change.old().or(change.new_value()) else {
                continue;
            };
            self.routes.remove_route(router_id, route)?;
            summary.routes_removed += 1;
        }
        for change in &routes_delta {
            let Some(new) = change.new_value() else {
                continue;
            };
            let (router_id, prefix) = *change.key();
            if self.routes.get_route(&RouteKey::new(router_id, prefix)).is_some() {
                continue;
            }
            self.routes.add_route(router_id, new)?;
            summary.routes_added += 1;
        }

        for change in delta.acls_delta() {
            let name = change.key();
            let desired = change.new_value().and_then(|acl| acl.counter.as_ref());
            if let Some(programmed) = self.acl_stats.get(name) {
                if Some(&programmed.counter) == desired {
                    continue;
                }
                self.retire_acl_stat(name);
            }
            if let Some(counter) = desired {
                self.program_acl_stat(name, counter)?;
                summary.acl_stats_added += 1;
            }
        }

        self.stats.refresh(delta)?;
        summary.acl_stats_removed = self.destroy_retired_stats();

        summary.groups_reaped = self.routes.reap_orphaned_groups();
        self.applied = Arc::clone(delta.new_state());
        info!(
            "applied delta: routes -{} +{}, acl stats -{} +{}",
            summary.routes_removed,
            summary.routes_added,
            summary.acl_stats_removed,
            summary.acl_stats_added
        );
        Ok(summary)
    }

    /// Stages removal of the counters programmed for `acl`. The hardware
    /// object is destroyed once no staged removal is left.
    fn retire_acl_stat(&mut self, acl: &str) {
        if let Some(stat) = self.acl_stats.remove(acl) {
            self.stats.to_be_removed_acl_stat(stat.handle);
            self.retired_stats.push(stat.handle);
            debug!("retiring hardware stat {} of acl {}", stat.handle, acl);
        }
    }

    /// Creates the hardware stat for `acl` and stages its counters.
    fn program_acl_stat(&mut self, acl: &str, counter: &AclCounterConfig) -> Result<()> {
        let types = parse_counter_types(counter)?;
        let handle = self.backend.create_acl_stat(&counter.name, &types)?;
        self.stats.to_be_added_acl_stat(handle, &counter.name, &types);
        self.acl_stats.insert(
            acl.to_string(),
            ProgrammedAclStat {
                handle,
                counter: counter.clone(),
            },
        );
        debug!("created hardware stat {} for acl {}", handle, acl);
        Ok(())
    }

    /// Destroys retired hardware stats whose counters are gone. Failed
    /// removals stay queued for the next delta.
    fn destroy_retired_stats(&mut self) -> usize {
        if self.stats.pending_removal_count() > 0 {
            return 0;
        }
        let before = self.retired_stats.len();
        let backend = Arc::clone(&self.backend);
        self.retired_stats
            .retain(|handle| match backend.remove_acl_stat(*handle) {
                Ok(()) => false,
                Err(e) => {
                    warn!("failed to remove hardware stat {}, will retry: {}", handle, e);
                    true
                }
            });
        before - self.retired_stats.len()
    }
}
