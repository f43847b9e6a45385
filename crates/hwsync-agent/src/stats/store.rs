//! Registry of live ACL counters.

use hwsync_hal::AclStatHandle;
use hwsync_types::CounterType;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::counter::{CounterSnapshot, MonotonicCounter};

/// Identifies one counter of one hardware ACL stat object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AclCounterDescriptor {
    pub handle: AclStatHandle,
    pub counter_type: CounterType,
}

impl AclCounterDescriptor {
    pub fn new(handle: AclStatHandle, counter_type: CounterType) -> Self {
        Self {
            handle,
            counter_type,
        }
    }
}

impl fmt::Display for AclCounterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.handle, self.counter_type)
    }
}

type CounterMap = BTreeMap<AclCounterDescriptor, Arc<MonotonicCounter>>;

/// Thread-safe map from descriptor to counter.
///
/// Structural changes go through [`CounterStore::write`]. Reading counters
/// and updating their values only needs the read lock.
#[derive(Debug, Default)]
pub struct CounterStore {
    counters: RwLock<CounterMap>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, descriptor: &AclCounterDescriptor) -> Option<Arc<MonotonicCounter>> {
        self.counters.read().get(descriptor).cloned()
    }

    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }

    /// Visits every counter while holding the read lock.
    pub fn for_each(&self, mut f: impl FnMut(&AclCounterDescriptor, &MonotonicCounter)) {
        for (descriptor, counter) in self.counters.read().iter() {
            f(descriptor, counter);
        }
    }

    pub fn snapshots(&self) -> Vec<CounterSnapshot> {
        self.counters.read().values().map(|c| c.snapshot()).collect()
    }

    /// Takes the write lock for a batch of structural changes.
    pub fn write(&self) -> CounterStoreWriter<'_> {
        CounterStoreWriter {
            guard: self.counters.write(),
        }
    }
}

/// Exclusive access to a [`CounterStore`].
pub struct CounterStoreWriter<'a> {
    guard: RwLockWriteGuard<'a, CounterMap>,
}

impl CounterStoreWriter<'_> {
    /// Removes every counter of `handle`, returning how many were dropped.
    pub fn remove_handle(&mut self, handle: AclStatHandle) -> usize {
        let before = self.guard.len();
        self.guard.retain(|descriptor, _| descriptor.handle != handle);
        before - self.guard.len()
    }

    /// Registers a counter. Returns false, leaving the map untouched, if the
    /// descriptor is already registered.
    pub fn insert(&mut self, descriptor: AclCounterDescriptor, counter: MonotonicCounter) -> bool {
        if self.guard.contains_key(&descriptor) {
            return false;
        }
        self.guard.insert(descriptor, Arc::new(counter));
        true
    }

    pub fn contains(&self, descriptor: &AclCounterDescriptor) -> bool {
        self.guard.contains_key(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn handle(raw: u64) -> AclStatHandle {
        AclStatHandle::from_raw(raw).unwrap()
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let store = CounterStore::new();
        let descriptor = AclCounterDescriptor::new(handle(7), CounterType::Packets);
        {
            let mut writer = store.write();
            assert!(writer.insert(descriptor, MonotonicCounter::new("acl1.packets")));
            assert!(!writer.insert(descriptor, MonotonicCounter::new("other.packets")));
        }
        assert_eq!(store.get(&descriptor).unwrap().name(), "acl1.packets");
    }

    #[test]
    fn test_remove_handle_drops_all_types() {
        let store = CounterStore::new();
        {
            let mut writer = store.write();
            for counter_type in CounterType::ALL {
                writer.insert(
                    AclCounterDescriptor::new(handle(7), counter_type),
                    MonotonicCounter::new(format!("acl1.{}", counter_type)),
                );
            }
            writer.insert(
                AclCounterDescriptor::new(handle(8), CounterType::Packets),
                MonotonicCounter::new("acl2.packets"),
            );
        }

        assert_eq!(store.write().remove_handle(handle(7)), 2);
        assert_eq!(store.len(), 1);
        assert!(store
            .get(&AclCounterDescriptor::new(handle(8), CounterType::Packets))
            .is_some());
        assert_eq!(store.write().remove_handle(handle(7)), 0);
    }

    #[test]
    fn test_for_each_in_descriptor_order() {
        let store = CounterStore::new();
        {
            let mut writer = store.write();
            writer.insert(
                AclCounterDescriptor::new(handle(9), CounterType::Bytes),
                MonotonicCounter::new("b.bytes"),
            );
            writer.insert(
                AclCounterDescriptor::new(handle(3), CounterType::Packets),
                MonotonicCounter::new("a.packets"),
            );
        }
        let mut names = Vec::new();
        store.for_each(|_, counter| names.push(counter.name().to_string()));
        assert_eq!(names, vec!["a.packets", "b.bytes"]);
    }
}
