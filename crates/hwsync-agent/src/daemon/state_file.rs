//! Loading the desired switch state from disk.

use hwsync_types::SwitchState;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StateFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads a JSON encoded [`SwitchState`].
pub fn load_state_file(path: &Path) -> Result<SwitchState, StateFileError> {
    let contents = fs::read_to_string(path).map_err(|source| StateFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let state: SwitchState =
        serde_json::from_str(&contents).map_err(|source| StateFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    info!(
        "loaded {} routes and {} acls from {}",
        state.route_count(),
        state.acls.len(),
        path.display()
    );
    Ok(state)
}
