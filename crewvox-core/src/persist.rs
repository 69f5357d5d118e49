//! Whole-document JSON persistence shared by the voice-print store and the
//! learned-phrase list.
//!
//! Every mutation rewrites the full document. Writes land in a temporary
//! sibling first and are renamed into place, so a crash mid-write leaves the
//! previous document intact. Reads never fail: a missing or unparsable file
//! yields `T::default()`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::{CrewVoxError, Result};

/// Load `path`, degrading to `T::default()` on any read or parse failure.
pub fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no persisted document yet");
            return T::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read persisted document, starting empty");
            return T::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "persisted document is corrupt, starting empty");
            T::default()
        }
    }
}

/// Serialise `value` as pretty JSON and atomically replace `path`.
pub fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| persistence(parent, source))?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, json).map_err(|source| persistence(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| persistence(path, source))?;
    Ok(())
}

/// Delete a backing file, tolerating one that is already gone.
pub fn remove_file_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn persistence(path: &Path, source: std::io::Error) -> CrewVoxError {
    CrewVoxError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}
