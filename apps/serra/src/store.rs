//! # Backends
//!
//! Opening a [`StateBackend`] by name, and the snapshot file backend.

use serra_core::formats::{decode_snapshot, encode_snapshot};
use serra_core::storage::{RedbStore, StateBackend};
use serra_core::{HomeState, SerraError};
use std::path::{Path, PathBuf};

/// Backend names accepted on the command line.
pub const BACKENDS: [&str; 2] = ["file", "redb"];

/// Keeps the whole state in one snapshot file.
///
/// Saves go to a sibling temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateBackend for FileStore {
    fn load(&self) -> serra_core::Result<Option<HomeState>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => decode_snapshot(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SerraError::Storage(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn save(&self, state: &HomeState) -> serra_core::Result<()> {
        let bytes = encode_snapshot(state)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                SerraError::Storage(format!("cannot write {}: {e}", self.path.display()))
            })
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

/// Open the backend named `kind` at `path`.
pub fn open_backend(path: &Path, kind: &str) -> serra_core::Result<Box<dyn StateBackend>> {
    match kind {
        "file" => Ok(Box::new(FileStore::new(path))),
        "redb" => Ok(Box::new(RedbStore::open(path)?)),
        other => Err(SerraError::Validation(format!(
            "unknown backend '{other}', expected one of: {}",
            BACKENDS.join(", ")
        ))),
    }
}

/// Load the stored state, or start from an empty one.
pub fn load_state(backend: &dyn StateBackend) -> serra_core::Result<HomeState> {
    Ok(backend.load()?.unwrap_or_default())
}
