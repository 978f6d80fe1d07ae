use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;
use crate::snapshot::{Snapshot, SNAPSHOT_VERSION};
use crate::wake::{FileWakeHint, WakeHint};

/// File name of the published record inside the shared directory.
pub const RECORD_FILE: &str = "snapshot.json";

/// Scratch file the record is written to before being renamed into place.
pub const TEMP_FILE: &str = "snapshot.json.tmp";

/// Marker rewritten by [`FileWakeHint`].
pub const WAKE_FILE: &str = "snapshot.wake";

/// Cross-process snapshot exchange over a shared directory.
///
/// There is one producer. Records are replaced with write-then-rename, so a
/// reader only ever sees a complete record. Construct one per process and
/// share it by reference.
pub struct SnapshotChannel {
    dir: PathBuf,
    wake: Box<dyn WakeHint>,
}

impl SnapshotChannel {
    pub fn new(dir: impl Into<PathBuf>, wake: Box<dyn WakeHint>) -> Self {
        Self {
            dir: dir.into(),
            wake,
        }
    }

    /// Channel whose wake hint is the marker file next to the record.
    pub fn with_file_wake(dir: impl Into<PathBuf>, min_interval: Duration) -> Self {
        let dir = dir.into();
        let wake = FileWakeHint::new(dir.join(WAKE_FILE), min_interval);
        Self::new(dir, Box::new(wake))
    }

    /// Create the shared directory if it does not exist yet.
    pub fn provision(&self) -> Result<(), SyncError> {
        fs::create_dir_all(&self.dir).map_err(|e| SyncError::storage(&self.dir, e))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    /// Atomically replace the shared record with `snapshot`.
    pub fn publish(&self, snapshot: &Snapshot) -> Result<(), SyncError> {
        let bytes = serde_json::to_vec(snapshot).map_err(SyncError::Serialization)?;
        let temp_path = self.dir.join(TEMP_FILE);
        let target = self.record_path();

        let mut file = File::create(&temp_path).map_err(|e| SyncError::storage(&temp_path, e))?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| SyncError::storage(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &target).map_err(|e| SyncError::storage(&target, e))?;
        log::debug!("published snapshot ({} bytes)", bytes.len());
        Ok(())
    }

    /// Read the current record. `Ok(None)` if nothing was ever published.
    pub fn load(&self) -> Result<Option<Snapshot>, SyncError> {
        let path = self.record_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::storage(path, e)),
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(SyncError::Deserialization)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SyncError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(Some(snapshot))
    }

    /// Hint that the consumer should re-render soon. May be ignored.
    pub fn notify_updated(&self) {
        self.wake.request_refresh();
    }

    /// Remove the shared record. Removing a missing record is not an error.
    pub fn clear(&self) -> Result<(), SyncError> {
        let path = self.record_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::storage(path, e)),
        }
    }
}
