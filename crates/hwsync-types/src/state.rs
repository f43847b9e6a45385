//! Declarative switch state and before/after deltas.
//!
//! A [`SwitchState`] is an immutable snapshot of what the switch should look
//! like. The agent receives a [`StateDelta`] (old snapshot, new snapshot) for
//! every configuration change and reconciles hardware against it.

use crate::{CounterType, InterfaceId, IpAddress, IpPrefix, ParseError, RouterId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::sync::Arc;

/// A next hop after neighbor resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolvedNextHop {
    pub addr: IpAddress,
    pub interface: InterfaceId,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl ResolvedNextHop {
    pub fn new(addr: IpAddress, interface: InterfaceId, weight: u32) -> Self {
        Self {
            addr,
            interface,
            weight,
        }
    }
}

/// What a route forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteNextHopEntry {
    ToCpu,
    Drop,
    NextHops(BTreeSet<ResolvedNextHop>),
}

impl RouteNextHopEntry {
    pub fn from_next_hops(next_hops: impl IntoIterator<Item = ResolvedNextHop>) -> Self {
        RouteNextHopEntry::NextHops(next_hops.into_iter().collect())
    }

    /// Returns true for TO_CPU and DROP.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RouteNextHopEntry::NextHops(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub prefix: IpPrefix,
    pub next_hop_entry: RouteNextHopEntry,
}

impl Route {
    pub fn new(prefix: IpPrefix, next_hop_entry: RouteNextHopEntry) -> Self {
        Self {
            prefix,
            next_hop_entry,
        }
    }
}

/// Counter attached to an ACL entry.
///
/// Counter types are kept as configured strings; they are validated when the
/// counter is programmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclCounterConfig {
    pub name: String,
    pub types: Vec<String>,
}

impl AclCounterConfig {
    pub fn new(name: impl Into<String>, types: &[CounterType]) -> Self {
        Self {
            name: name.into(),
            types: types.iter().map(|t| t.as_str().to_string()).collect(),
        }
    }

    /// Parses the configured types.
    pub fn counter_types(&self) -> Result<Vec<CounterType>, ParseError> {
        self.types.iter().map(|t| t.parse()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub name: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub counter: Option<AclCounterConfig>,
}

impl AclEntry {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            counter: None,
        }
    }

    pub fn with_counter(mut self, counter: AclCounterConfig) -> Self {
        self.counter = Some(counter);
        self
    }
}

/// Routes of one virtual router, keyed by prefix.
pub type RouteTable = BTreeMap<IpPrefix, Route>;

/// Snapshot of the desired switch configuration.
///
/// Route tables are keyed by the network form of each route's prefix and ACLs
/// by their name. Deserialization rejects input that breaks either rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSwitchState")]
pub struct SwitchState {
    pub route_tables: BTreeMap<RouterId, RouteTable>,
    pub acls: BTreeMap<String, AclEntry>,
}

/// Wire form of [`SwitchState`] before key validation.
#[derive(Deserialize)]
struct RawSwitchState {
    #[serde(default)]
    route_tables: BTreeMap<RouterId, RouteTable>,
    #[serde(default)]
    acls: BTreeMap<String, AclEntry>,
}

impl TryFrom<RawSwitchState> for SwitchState {
    type Error = ParseError;

    fn try_from(raw: RawSwitchState) -> Result<Self, Self::Error> {
        for (router_id, table) in &raw.route_tables {
            for (key, route) in table {
                if *key != key.network() {
                    return Err(ParseError::InvalidState(format!(
                        "route key {} in {} is not a network prefix",
                        key, router_id
                    )));
                }
                if *key != route.prefix.network() {
                    return Err(ParseError::InvalidState(format!(
                        "route key {} in {} holds a route for {}",
                        key, router_id, route.prefix
                    )));
                }
            }
        }
        if let Some((key, acl)) = raw.acls.iter().find(|(key, acl)| **key != acl.name) {
            return Err(ParseError::InvalidState(format!(
                "acl key {} holds acl {}",
                key, acl.name
            )));
        }

        Ok(Self {
            route_tables: raw.route_tables,
            acls: raw.acls,
        })
    }
}

impl SwitchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a route, keyed by its network prefix.
    pub fn add_route(&mut self, router_id: RouterId, route: Route) {
        let prefix = route.prefix.network();
        self.route_tables
            .entry(router_id)
            .or_default()
            .insert(prefix, route);
    }

    pub fn remove_route(&mut self, router_id: RouterId, prefix: &IpPrefix) -> Option<Route> {
        let table = self.route_tables.get_mut(&router_id)?;
        let removed = table.remove(&prefix.network());
        if table.is_empty() {
            self.route_tables.remove(&router_id);
        }
        removed
    }

    pub fn add_acl(&mut self, acl: AclEntry) {
        self.acls.insert(acl.name.clone(), acl);
    }

    pub fn remove_acl(&mut self, name: &str) -> Option<AclEntry> {
        self.acls.remove(name)
    }

    pub fn route_count(&self) -> usize {
        self.route_tables.values().map(|t| t.len()).sum()
    }

    /// Counts routes per address family as (v4, v6).
    pub fn route_count_by_family(&self) -> (usize, usize) {
        self.routes().fold((0, 0), |(v4, v6), (_, route)| {
            if route.prefix.is_ipv4() {
                (v4 + 1, v6)
            } else {
                (v4, v6 + 1)
            }
        })
    }

    /// Iterates every route in (router, prefix) order.
    pub fn routes(&self) -> impl Iterator<Item = ((RouterId, IpPrefix), &Route)> {
        self.route_tables.iter().flat_map(|(router_id, table)| {
            table
                .iter()
                .map(move |(prefix, route)| ((*router_id, *prefix), route))
        })
    }

    /// Distinct non-empty next-hop sets referenced by routes. Empty sets are
    /// programmed as DROP and never need a group.
    pub fn distinct_next_hop_sets(&self) -> BTreeSet<&BTreeSet<ResolvedNextHop>> {
        self.routes()
            .filter_map(|(_, route)| match &route.next_hop_entry {
                RouteNextHopEntry::NextHops(set) if !set.is_empty() => Some(set),
                _ => None,
            })
            .collect()
    }
}

/// One keyed difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaValue<'a, K, V> {
    Added(K, &'a V),
    Removed(K, &'a V),
    Changed(K, &'a V, &'a V),
}

impl<'a, K, V> DeltaValue<'a, K, V> {
    pub fn key(&self) -> &K {
        match self {
            DeltaValue::Added(k, _) | DeltaValue::Removed(k, _) | DeltaValue::Changed(k, _, _) => {
                k
            }
        }
    }

    pub fn old(&self) -> Option<&'a V> {
        match self {
            DeltaValue::Added(..) => None,
            DeltaValue::Removed(_, old) | DeltaValue::Changed(_, old, _) => Some(old),
        }
    }

    pub fn new_value(&self) -> Option<&'a V> {
        match self {
            DeltaValue::Removed(..) => None,
            DeltaValue::Added(_, new) | DeltaValue::Changed(_, _, new) => Some(new),
        }
    }
}

/// Before/after pair of switch snapshots.
#[derive(Debug, Clone)]
pub struct StateDelta {
    old: Arc<SwitchState>,
    new: Arc<SwitchState>,
}

impl StateDelta {
    pub fn new(old: Arc<SwitchState>, new: Arc<SwitchState>) -> Self {
        Self { old, new }
    }

    /// Delta that programs `state` onto an empty switch.
    pub fn from_empty(state: Arc<SwitchState>) -> Self {
        Self::new(Arc::new(SwitchState::default()), state)
    }

    pub fn old_state(&self) -> &Arc<SwitchState> {
        &self.old
    }

    pub fn new_state(&self) -> &Arc<SwitchState> {
        &self.new
    }

    pub fn routes_delta(&self) -> Vec<DeltaValue<'_, (RouterId, IpPrefix), Route>> {
        diff_sorted(self.old.routes(), self.new.routes())
    }

    pub fn acls_delta(&self) -> Vec<DeltaValue<'_, String, AclEntry>> {
        diff_sorted(
            self.old.acls.iter().map(|(k, v)| (k.clone(), v)),
            self.new.acls.iter().map(|(k, v)| (k.clone(), v)),
        )
    }
}

/// Merges two key-sorted streams into a list of differences.
fn diff_sorted<'a, K, V, O, N>(old: O, new: N) -> Vec<DeltaValue<'a, K, V>>
where
    K: Ord,
    V: PartialEq + 'a,
    O: Iterator<Item = (K, &'a V)>,
    N: Iterator<Item = (K, &'a V)>,
{
    let mut old: Peekable<O> = old.peekable();
    let mut new: Peekable<N> = new.peekable();
    let mut out = Vec::new();

    loop {
        let order = match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some((ok, _)), Some((nk, _))) => ok.cmp(nk),
        };

        match order {
            std::cmp::Ordering::Less => {
                if let Some((k, v)) = old.next() {
                    out.push(DeltaValue::Removed(k, v));
                }
            }
            std::cmp::Ordering::Greater => {
                if let Some((k, v)) = new.next() {
                    out.push(DeltaValue::Added(k, v));
                }
            }
            std::cmp::Ordering::Equal => {
                if let (Some((k, ov)), Some((_, nv))) = (old.next(), new.next()) {
                    if ov != nv {
                        out.push(DeltaValue::Changed(k, ov, nv));
                    }
                }
            }
        }
    }

    out
}
