//! Type-safe hardware object handles.
//!
//! Handles of different object kinds cannot be mixed: a route entry handle
//! will not type-check where a next-hop group handle is expected.

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw handle value as returned by a vendor SDK.
pub type RawObjectId = u64;

/// Marker trait for hardware object kinds.
pub trait HwObjectKind: Send + Sync + 'static {
    fn type_name() -> &'static str;
}

/// A handle to a hardware object of kind `T`.
#[derive(Clone, Copy)]
pub struct HwObjectId<T: HwObjectKind> {
    raw: RawObjectId,
    _marker: PhantomData<T>,
}

impl<T: HwObjectKind> HwObjectId<T> {
    /// Returns `None` for the null handle 0.
    pub fn from_raw(raw: RawObjectId) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    pub const fn as_raw(&self) -> RawObjectId {
        self.raw
    }
}

impl<T: HwObjectKind> fmt::Debug for HwObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:x})", T::type_name(), self.raw)
    }
}

impl<T: HwObjectKind> fmt::Display for HwObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:x}", T::type_name(), self.raw)
    }
}

impl<T: HwObjectKind> PartialEq for HwObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: HwObjectKind> Eq for HwObjectId<T> {}

impl<T: HwObjectKind> PartialOrd for HwObjectId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: HwObjectKind> Ord for HwObjectId<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: HwObjectKind> Hash for HwObjectId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $oid_alias:ident) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl HwObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        pub type $oid_alias = HwObjectId<$name>;
    };
}

define_object_kind!(RouteEntryKind, "RouteEntry", RouteEntryOid);
define_object_kind!(NextHopGroupKind, "NextHopGroup", NextHopGroupOid);
define_object_kind!(AclStatKind, "AclStat", AclStatHandle);
