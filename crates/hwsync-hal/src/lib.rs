//! Hardware abstraction for the synchronization layer.
//!
//! - [`types`]: typed handles for hardware objects
//! - [`error`]: SDK status codes and [`HwError`]
//! - [`capability`]: the per-ASIC-family capability table
//! - [`backend`]: the [`VendorBackend`] trait every ASIC family implements
//! - [`fake`]: an in-memory [`FakeBackend`]

pub mod backend;
pub mod capability;
pub mod error;
pub mod fake;
pub mod types;

pub use backend::{derive_table_stats, RouteTarget, TableStat, VendorBackend};
pub use capability::{AsicCapability, AsicFamily};
pub use error::{HwError, HwResult, HwStatus};
pub use fake::{FakeBackend, FakeOp};
pub use types::{
    AclStatHandle, AclStatKind, HwObjectId, HwObjectKind, NextHopGroupKind, NextHopGroupOid,
    RawObjectId, RouteEntryKind, RouteEntryOid,
};
