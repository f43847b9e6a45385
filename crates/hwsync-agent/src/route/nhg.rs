//! Next-hop group keys and the shared group table.
//!
//! Routes with identical resolved next hops share one hardware group. The
//! table is keyed by the canonical next-hop set and reference counted by the
//! number of routes bound to each group.

use hwsync_common::{HasRefCount, SyncMap};
use hwsync_hal::NextHopGroupOid;
use hwsync_types::ResolvedNextHop;
use std::collections::BTreeSet;
use std::fmt;

/// Canonical (sorted, de-duplicated) set of next hops.
///
/// Two keys built from the same next hops in any order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NextHopGroupKey {
    nexthops: BTreeSet<ResolvedNextHop>,
}

impl NextHopGroupKey {
    pub fn from_next_hops(nexthops: impl IntoIterator<Item = ResolvedNextHop>) -> Self {
        Self {
            nexthops: nexthops.into_iter().collect(),
        }
    }

    /// Members in canonical order, as handed to the backend.
    pub fn members(&self) -> Vec<ResolvedNextHop> {
        self.nexthops.iter().cloned().collect()
    }
}

impl From<&BTreeSet<ResolvedNextHop>> for NextHopGroupKey {
    fn from(nexthops: &BTreeSet<ResolvedNextHop>) -> Self {
        Self {
            nexthops: nexthops.clone(),
        }
    }
}

impl fmt::Display for NextHopGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = self
            .nexthops
            .iter()
            .map(|nh| format!("{}@{}*{}", nh.addr, nh.interface, nh.weight))
            .collect();
        write!(f, "[{}]", parts.join(","))
    }
}

/// A programmed next-hop group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHopGroupEntry {
    oid: NextHopGroupOid,
    ref_count: u32,
}

impl NextHopGroupEntry {
    /// A freshly acquired group starts with the reference of the route that
    /// needed it.
    pub fn new(oid: NextHopGroupOid) -> Self {
        Self { oid, ref_count: 1 }
    }

    pub fn oid(&self) -> NextHopGroupOid {
        self.oid
    }
}

impl HasRefCount for NextHopGroupEntry {
    fn increment_ref(&mut self) -> u32 {
        self.ref_count += 1;
        self.ref_count
    }

    fn decrement_ref(&mut self) -> Option<u32> {
        self.ref_count = self.ref_count.checked_sub(1)?;
        Some(self.ref_count)
    }

    fn ref_count(&self) -> u32 {
        self.ref_count
    }
}

pub type NextHopGroupTable = SyncMap<NextHopGroupKey, NextHopGroupEntry>;
