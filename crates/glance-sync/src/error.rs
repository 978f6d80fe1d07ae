use std::path::PathBuf;

/// Errors from the snapshot channel.
///
/// None of these are fatal to a live session; callers log them and carry on
/// unsynced.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The shared location is missing or not writable/readable.
    #[error("snapshot storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A record exists but could not be decoded.
    #[error("snapshot record is malformed: {0}")]
    Deserialization(#[source] serde_json::Error),
    #[error("snapshot could not be encoded: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("failed to watch snapshot directory: {0}")]
    Watch(#[from] notify::Error),
}

impl SyncError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }
}
