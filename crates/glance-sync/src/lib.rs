//! glance-sync: the cross-process snapshot channel.
//!
//! The producer publishes a versioned [`Snapshot`] record into a shared
//! directory with an atomic replace; an independent viewer process loads it,
//! decodes the last few lines and shows them. A best-effort [`WakeHint`]
//! asks the viewer to refresh sooner, and [`watch_snapshots`] lets a viewer
//! react to both.

pub mod channel;
pub mod error;
pub mod snapshot;
pub mod viewer;
pub mod wake;
pub mod watcher;

pub use channel::{SnapshotChannel, RECORD_FILE, TEMP_FILE, WAKE_FILE};
pub use error::SyncError;
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
pub use viewer::{load_frame, ViewerFrame, DEFAULT_TAIL_LINES};
pub use wake::{FileWakeHint, NoopWakeHint, WakeHint};
pub use watcher::{watch_snapshots, SnapshotEvent};
