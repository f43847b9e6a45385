//! Helpers shared by the hardware managers.
//!
//! [`SyncMap`] is the table type for hardware objects that several owners
//! share by reference count. It never creates an entry as a side effect of a
//! lookup or a reference-count change.

pub mod sync_map;

pub use sync_map::{HasRefCount, SyncMap, SyncMapError};
