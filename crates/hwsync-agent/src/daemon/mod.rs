//! Daemon plumbing for `hwsyncd`.

mod poller;
mod state_file;

pub use poller::{StatsPoller, StatsPollerConfig};
pub use state_file::{load_state_file, StateFileError};
