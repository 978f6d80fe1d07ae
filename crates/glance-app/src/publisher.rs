use std::sync::Arc;
use std::time::Duration;

use glance_sync::{Snapshot, SnapshotChannel};
use tokio::time::Instant;

use crate::debounce::Debouncer;

/// Coalesces output bursts into debounced snapshot publishes.
///
/// Publish failures are logged and leave the publisher "unsynced" until a
/// later publish succeeds; they never reach the live session.
pub struct Publisher {
    channel: Arc<SnapshotChannel>,
    debounce: Debouncer,
    synced: bool,
    published: u64,
}

impl Publisher {
    pub fn new(channel: Arc<SnapshotChannel>, delay: Duration) -> Self {
        Self {
            channel,
            debounce: Debouncer::new(delay),
            synced: true,
            published: 0,
        }
    }

    /// Schedule a publish, replacing any pending one.
    pub fn schedule(&mut self) {
        self.debounce.arm();
    }

    /// When the pending publish is due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// `true` (and disarmed) if the pending publish is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        self.debounce.fire_if_due(now)
    }

    /// Publish immediately, cancelling any pending publish.
    ///
    /// Returns `true` if the record was written.
    pub fn publish_now(&mut self, snapshot: &Snapshot) -> bool {
        self.debounce.cancel();
        match self.channel.publish(snapshot) {
            Ok(()) => {
                if !self.synced {
                    log::info!("snapshot publishing recovered");
                }
                self.synced = true;
                self.published += 1;
                self.channel.notify_updated();
                true
            }
            Err(e) => {
                log::warn!("snapshot publish failed, continuing unsynced: {e}");
                self.synced = false;
                false
            }
        }
    }

    /// `false` while the last publish attempt failed.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn publish_count(&self) -> u64 {
        self.published
    }
}
