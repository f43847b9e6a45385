//! Reference-counted map that never auto-creates entries.
//!
//! Entries are added only through [`SyncMap::insert`]. Reference counts move
//! only on entries that already exist, and [`SyncMap::release`] hands the
//! entry back to the caller once its last reference is dropped so the caller
//! can free the underlying hardware object.

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncMapError {
    #[error("key not found")]
    KeyNotFound,

    #[error("reference count underflow")]
    RefCountUnderflow,
}

/// Values that track how many owners point at them.
pub trait HasRefCount {
    /// Increments the count and returns the new value.
    fn increment_ref(&mut self) -> u32;

    /// Decrements the count and returns the new value, or `None` on underflow.
    fn decrement_ref(&mut self) -> Option<u32>;

    fn ref_count(&self) -> u32;
}

#[derive(Debug, Clone)]
pub struct SyncMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns `None` for a missing key. Never creates an entry.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Returns `None` for a missing key. Never creates an entry.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Inserts an entry, returning the previous value for the key.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
    V: HasRefCount,
{
    /// Adds a reference to an existing entry and returns the new count.
    pub fn increment_ref(&mut self, key: &K) -> Result<u32, SyncMapError> {
        self.inner
            .get_mut(key)
            .map(|entry| entry.increment_ref())
            .ok_or(SyncMapError::KeyNotFound)
    }

    /// Drops a reference from an existing entry and returns the new count.
    /// The entry stays in the map even at zero.
    pub fn decrement_ref(&mut self, key: &K) -> Result<u32, SyncMapError> {
        let entry = self.inner.get_mut(key).ok_or(SyncMapError::KeyNotFound)?;
        entry.decrement_ref().ok_or(SyncMapError::RefCountUnderflow)
    }

    /// Drops a reference and removes the entry when none remain.
    ///
    /// Returns the removed value when this was the last reference.
    pub fn release(&mut self, key: &K) -> Result<Option<V>, SyncMapError> {
        if self.decrement_ref(key)? == 0 {
            Ok(self.inner.remove(key))
        } else {
            Ok(None)
        }
    }

    pub fn ref_count(&self, key: &K) -> Option<u32> {
        self.inner.get(key).map(|e| e.ref_count())
    }
}

impl<K, V> Default for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
