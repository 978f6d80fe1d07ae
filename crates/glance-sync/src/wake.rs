//! Best-effort "please refresh soon" hints for the consumer.
//!
//! A hint may be throttled or dropped at any point. Consumers must also
//! refresh on their own schedule.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait WakeHint: Send + Sync {
    /// Ask the consumer to re-render. Never fails; problems are logged.
    fn request_refresh(&self);
}

/// Drops every hint.
#[derive(Debug, Default)]
pub struct NoopWakeHint;

impl WakeHint for NoopWakeHint {
    fn request_refresh(&self) {}
}

/// Rewrites a marker file that a watching consumer reacts to.
///
/// Hints arriving within `min_interval` of the last delivered one are
/// dropped, mirroring a host that rate-limits refresh requests.
pub struct FileWakeHint {
    path: PathBuf,
    min_interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl FileWakeHint {
    pub fn new(path: impl Into<PathBuf>, min_interval: Duration) -> Self {
        Self {
            path: path.into(),
            min_interval,
            last_sent: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl WakeHint for FileWakeHint {
    fn request_refresh(&self) {
        let mut last_sent = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        if let Some(prev) = *last_sent {
            if now.duration_since(prev) < self.min_interval {
                log::debug!("wake hint throttled");
                return;
            }
        }

        let stamp = chrono::Utc::now().to_rfc3339();
        match std::fs::write(&self.path, stamp) {
            Ok(()) => *last_sent = Some(now),
            Err(e) => log::warn!("failed to write wake marker {}: {e}", self.path.display()),
        }
    }
}
