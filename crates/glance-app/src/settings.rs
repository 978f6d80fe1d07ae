//! Runtime settings, read from an optional JSON file and CLI overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use glance_pty::ShellConfig;
use glance_sync::{SnapshotChannel, DEFAULT_TAIL_LINES};
use serde::Deserialize;

use crate::buffer::DEFAULT_CAP;

/// Everything the app needs to know; the libraries never read the
/// environment themselves.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// Shell binary. `None` uses `$SHELL`, falling back to `/bin/sh`.
    pub shell: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
    /// Bytes of output retained.
    pub buffer_cap: usize,
    pub debounce_ms: u64,
    /// Lines a viewer decodes from the snapshot.
    pub tail_lines: usize,
    /// Shared directory holding the snapshot record.
    pub state_dir: PathBuf,
    /// Minimum spacing between wake hints.
    pub wake_interval_ms: u64,
    /// Viewer refresh period when no change is reported.
    pub fallback_refresh_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell: None,
            working_dir: None,
            cols: 80,
            rows: 24,
            buffer_cap: DEFAULT_CAP,
            debounce_ms: 1000,
            tail_lines: DEFAULT_TAIL_LINES,
            state_dir: default_state_dir(),
            wake_interval_ms: 1000,
            fallback_refresh_secs: 60,
        }
    }
}

impl Settings {
    /// Read settings from a JSON file; missing keys take their defaults.
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid settings file {}", path.display()))
    }

    pub fn shell_config(&self) -> ShellConfig {
        ShellConfig {
            shell: self.shell.clone(),
            cwd: self.working_dir.clone(),
            cols: self.cols,
            rows: self.rows,
            env: Vec::new(),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fallback_refresh(&self) -> Duration {
        Duration::from_secs(self.fallback_refresh_secs)
    }

    /// Directory reported in snapshots before the shell reports its own.
    pub fn initial_directory(&self) -> String {
        self.working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .map(|dir| dir.display().to_string())
            .unwrap_or_default()
    }

    /// The process-wide snapshot channel for `state_dir`.
    pub fn snapshot_channel(&self) -> SnapshotChannel {
        SnapshotChannel::with_file_wake(&self.state_dir, Duration::from_millis(self.wake_interval_ms))
    }
}

/// `<local data dir>/glance`, or a temp directory when there is none.
fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("glance")
}
