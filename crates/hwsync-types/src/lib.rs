//! Vendor-neutral types shared by the hardware synchronization layer.
//!
//! - [`IpAddress`] / [`IpPrefix`]: route destinations and next-hop addresses
//! - [`RouterId`], [`InterfaceId`], [`PortId`]: switch-local identifiers
//! - [`CounterType`]: the kinds of ACL counters the hardware can keep
//! - [`SwitchState`] / [`StateDelta`]: the declarative model the agent applies

mod counter;
mod ids;
mod ip;
pub mod state;

pub use counter::CounterType;
pub use ids::{InterfaceId, PortId, RouterId};
pub use ip::{IpAddress, IpPrefix};
pub use state::{
    AclCounterConfig, AclEntry, DeltaValue, ResolvedNextHop, Route, RouteNextHopEntry,
    StateDelta, SwitchState,
};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("unknown counter type: {0}")]
    InvalidCounterType(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("inconsistent switch state: {0}")]
    InvalidState(String),
}
