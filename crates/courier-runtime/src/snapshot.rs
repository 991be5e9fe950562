//! On-disk `{"matches": [...]}` snapshot format.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use courier_core::{Destination, ReferenceState};
use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

/// Serialized form of a [`ReferenceState`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Destinations in active order.
    #[serde(default)]
    pub matches: Vec<Destination>,
}

impl From<&ReferenceState> for SnapshotDocument {
    fn from(state: &ReferenceState) -> Self {
        Self {
            matches: state.destinations().to_vec(),
        }
    }
}

impl From<SnapshotDocument> for ReferenceState {
    fn from(document: SnapshotDocument) -> Self {
        Self::new(document.matches)
    }
}

/// Read and decode the snapshot at `path`.
///
/// # Errors
///
/// Returns [`RuntimeError::Io`] when the file cannot be read and
/// [`RuntimeError::Json`] when it is not a valid snapshot.
pub fn read_snapshot(path: &Path) -> RuntimeResult<ReferenceState> {
    let raw = fs::read(path).map_err(|err| RuntimeError::io("snapshot.read", path, err))?;
    let document: SnapshotDocument = serde_json::from_slice(&raw)
        .map_err(|err| RuntimeError::json("snapshot.decode", path, err))?;
    Ok(document.into())
}

/// Write the snapshot so the file at `path` is always either the previous
/// complete version or the new complete version.
///
/// # Errors
///
/// Returns [`RuntimeError`] when encoding, writing, syncing, or the final
/// rename fails. A stray staging file is removed on failure.
pub fn write_snapshot(path: &Path, state: &ReferenceState) -> RuntimeResult<()> {
    let body = serde_json::to_vec_pretty(&SnapshotDocument::from(state))
        .map_err(|err| RuntimeError::json("snapshot.encode", path, err))?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| RuntimeError::io("snapshot.create_parent", parent, err))?;
    }

    let staging = staging_path(path);
    let result = write_synced(&staging, &body).and_then(|()| {
        fs::rename(&staging, path).map_err(|err| RuntimeError::io("snapshot.rename", path, err))
    });
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

fn write_synced(staging: &Path, body: &[u8]) -> RuntimeResult<()> {
    let mut file =
        File::create(staging).map_err(|err| RuntimeError::io("snapshot.create", staging, err))?;
    file.write_all(body)
        .map_err(|err| RuntimeError::io("snapshot.write", staging, err))?;
    file.sync_all()
        .map_err(|err| RuntimeError::io("snapshot.sync", staging, err))
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "snapshot".into(), |name| name.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.tmp"))
}
