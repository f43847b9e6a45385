//! Integration tests for the agent against the in-memory backend.
//!
//! These exercise the managers through their public API only, with the
//! [`FakeBackend`] standing in for an ASIC.

use hwsync_agent::route::{NextHopGroupKey, RouteKey, RouteManager};
use hwsync_agent::stats::{MemoryMetricsSink, StatError, StatUpdater};
use hwsync_agent::HwSwitch;
use hwsync_hal::{AclStatHandle, FakeBackend, FakeOp, HwStatus, RouteTarget};
use hwsync_types::{
    AclCounterConfig, AclEntry, CounterType, InterfaceId, IpPrefix, PortId, ResolvedNextHop,
    Route, RouteNextHopEntry, RouterId, StateDelta, SwitchState,
};
use std::sync::Arc;

fn nh(addr: &str, intf: u32) -> ResolvedNextHop {
    ResolvedNextHop::new(addr.parse().unwrap(), InterfaceId::new(intf), 1)
}

fn prefix(s: &str) -> IpPrefix {
    s.parse().unwrap()
}

fn route(p: &str, hops: &[ResolvedNextHop]) -> Route {
    Route::new(prefix(p), RouteNextHopEntry::from_next_hops(hops.iter().cloned()))
}

fn handle(raw: u64) -> AclStatHandle {
    AclStatHandle::from_raw(raw).unwrap()
}

fn empty_delta() -> StateDelta {
    StateDelta::from_empty(Arc::new(SwitchState::new()))
}

fn stat_updater(backend: &Arc<FakeBackend>) -> (Arc<MemoryMetricsSink>, StatUpdater) {
    let sink = Arc::new(MemoryMetricsSink::new());
    let updater = StatUpdater::new(backend.clone(), sink.clone());
    (sink, updater)
}

mod route_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_two_prefixes_share_one_group() {
        let backend = Arc::new(FakeBackend::default());
        let mut routes = RouteManager::new(backend.clone());
        let vrf = RouterId::new(0);
        let hops = [nh("10.1.1.1", 1), nh("10.1.1.2", 2)];
        let key = NextHopGroupKey::from_next_hops(hops.iter().cloned());

        let first = route("10.0.0.0/24", &hops);
        // Same set in a different order.
        let second = route("10.0.1.0/24", &[hops[1].clone(), hops[0].clone()]);

        routes.add_route(vrf, &first).unwrap();
        routes.add_route(vrf, &second).unwrap();
        assert_eq!(routes.next_hop_group_ref_count(&key), Some(2));
        assert_eq!(backend.next_hop_group_count(), 1);

        let group = routes.next_hop_group_handle(&key).unwrap();
        for p in ["10.0.0.0/24", "10.0.1.0/24"] {
            let entry = routes.get_route(&RouteKey::new(vrf, prefix(p))).unwrap();
            assert_eq!(entry.target, RouteTarget::NextHopGroup(group));
        }

        routes.remove_route(vrf, &first).unwrap();
        assert_eq!(routes.next_hop_group_ref_count(&key), Some(1));
        assert_eq!(backend.next_hop_group_count(), 1);

        routes.remove_route(vrf, &second).unwrap();
        assert_eq!(routes.next_hop_group_ref_count(&key), None);
        assert_eq!(backend.next_hop_group_count(), 0);
        assert_eq!(backend.route_count(), 0);
    }

    #[test]
    fn test_terminal_routes_skip_group_table() {
        let backend = Arc::new(FakeBackend::default());
        let mut routes = RouteManager::new(backend.clone());
        let vrf = RouterId::new(1);

        routes
            .add_route(vrf, &Route::new(prefix("0.0.0.0/0"), RouteNextHopEntry::Drop))
            .unwrap();
        routes
            .add_route(vrf, &Route::new(prefix("fe80::/10"), RouteNextHopEntry::ToCpu))
            .unwrap();

        assert_eq!(routes.route_count(), 2);
        assert_eq!(routes.next_hop_group_count(), 0);
        assert_eq!(
            backend.route_target(vrf, &prefix("fe80::/10")),
            Some(RouteTarget::ToCpu)
        );
    }

    #[test]
    fn test_failed_route_programming_rolls_back_group() {
        let backend = Arc::new(FakeBackend::default());
        let mut routes = RouteManager::new(backend.clone());
        let vrf = RouterId::new(0);

        backend.fail_next(FakeOp::CreateRoute, HwStatus::InsufficientResources);
        assert!(routes
            .add_route(vrf, &route("10.0.0.0/24", &[nh("10.1.1.1", 1)]))
            .is_err());

        assert_eq!(routes.route_count(), 0);
        assert_eq!(routes.next_hop_group_count(), 0);
        assert_eq!(backend.next_hop_group_count(), 0);
    }
}

mod stat_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_acl_counters_appear_after_refresh() {
        let backend = Arc::new(FakeBackend::default());
        let (_sink, updater) = stat_updater(&backend);

        updater.to_be_added_acl_stat(handle(7), "acl1", &[CounterType::Packets, CounterType::Bytes]);
        assert!(updater.get_counter_if(handle(7), CounterType::Packets).is_none());
        assert!(updater.get_counter_if(handle(7), CounterType::Bytes).is_none());

        updater.refresh(&empty_delta()).unwrap();

        assert_eq!(
            updater
                .get_counter_if(handle(7), CounterType::Packets)
                .unwrap()
                .name(),
            "acl1.packets"
        );
        assert_eq!(
            updater
                .get_counter_if(handle(7), CounterType::Bytes)
                .unwrap()
                .name(),
            "acl1.bytes"
        );
    }

    #[test]
    fn test_re_adding_active_counter_fails() {
        let backend = Arc::new(FakeBackend::default());
        let (_sink, updater) = stat_updater(&backend);

        updater.to_be_added_acl_stat(handle(7), "acl1", &[CounterType::Packets]);
        updater.refresh(&empty_delta()).unwrap();

        updater.to_be_added_acl_stat(handle(7), "acl1", &[CounterType::Packets]);
        assert!(matches!(
            updater.refresh(&empty_delta()),
            Err(StatError::DuplicateCounter { .. })
        ));
        assert_eq!(updater.get_counter_count(), 1);
    }

    #[test]
    fn test_remove_and_add_in_same_refresh() {
        let backend = Arc::new(FakeBackend::default());
        let (_sink, updater) = stat_updater(&backend);

        updater.to_be_added_acl_stat(handle(7), "acl1", &[CounterType::Packets, CounterType::Bytes]);
        updater.refresh(&empty_delta()).unwrap();

        updater.to_be_removed_acl_stat(handle(7));
        updater.to_be_added_acl_stat(handle(7), "acl1", &[CounterType::Packets, CounterType::Bytes]);
        updater.refresh(&empty_delta()).unwrap();

        assert_eq!(updater.get_counter_count(), 2);
        assert_eq!(
            updater
                .get_counter_if(handle(7), CounterType::Packets)
                .unwrap()
                .sum(),
            0
        );
    }

    #[test]
    fn test_clear_port_stats_stops_on_failure() {
        let backend = Arc::new(FakeBackend::default());
        let (_sink, updater) = stat_updater(&backend);
        backend.fail_port_clear(PortId::new(2));

        let cleared =
            updater.clear_port_stats(&[PortId::new(1), PortId::new(2), PortId::new(3)]);

        assert_eq!(cleared, 1);
        assert_eq!(backend.cleared_ports(), vec![PortId::new(1)]);
    }
}

mod switch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_end_to_end_counters() {
        let backend = Arc::new(FakeBackend::default());
        let (sink, updater) = stat_updater(&backend);
        let stats = Arc::new(updater);
        let mut hw = HwSwitch::new(backend.clone(), stats.clone());

        let mut state = SwitchState::new();
        state.add_route(RouterId::new(0), route("10.0.0.0/24", &[nh("10.1.1.1", 1)]));
        state.add_acl(
            AclEntry::new("drop-telnet", 100)
                .with_counter(AclCounterConfig::new("telnet", &[CounterType::Packets])),
        );
        hw.apply_state(Arc::new(state)).unwrap();

        let stat = hw.acl_stat_handle("drop-telnet").unwrap();
        backend.set_acl_stat_value(stat, CounterType::Packets, 3).unwrap();
        stats.update_stats();
        backend.set_acl_stat_value(stat, CounterType::Packets, 8).unwrap();
        stats.update_stats();
        stats.export_counters();

        assert_eq!(sink.counter("telnet.packets").unwrap().sum, 5);
        assert_eq!(sink.table("lpm_ipv4").unwrap().used, 1);
        assert_eq!(sink.table("acl_counters").unwrap().used, 1);

        hw.apply_state(Arc::new(SwitchState::new())).unwrap();
        assert_eq!(stats.get_counter_count(), 0);
        assert_eq!(backend.acl_stat_count(), 0);
        assert_eq!(backend.route_count(), 0);
        assert_eq!(backend.next_hop_group_count(), 0);
    }
}
