use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc;

use crate::channel::{RECORD_FILE, WAKE_FILE};
use crate::error::SyncError;

/// Changes a consumer reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotEvent {
    /// The record was replaced or removed.
    RecordChanged,
    /// The producer asked for a refresh.
    WakeRequested,
}

/// Watch the shared directory for record and wake-marker changes.
///
/// Returns a receiver that emits [`SnapshotEvent`]s, plus a handle that
/// must be kept alive for as long as events are wanted.
pub fn watch_snapshots(
    dir: &Path,
) -> Result<(mpsc::Receiver<SnapshotEvent>, RecommendedWatcher), SyncError> {
    let (tx, rx) = mpsc::channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                for path in &event.paths {
                    let kind = match path.file_name().and_then(|n| n.to_str()) {
                        Some(RECORD_FILE) => SnapshotEvent::RecordChanged,
                        Some(WAKE_FILE) => SnapshotEvent::WakeRequested,
                        _ => continue,
                    };
                    let _ = tx.send(kind);
                }
            }
            Err(e) => log::warn!("snapshot watch error: {e}"),
        },
        Config::default(),
    )?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    Ok((rx, watcher))
}
