use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "glance",
    version,
    about = "Run a shell and mirror its recent output to a glanceable viewer"
)]
pub struct Cli {
    /// JSON settings file; command-line options override it.
    #[arg(long, global = true, env = "GLANCE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Shared directory holding the snapshot record.
    #[arg(long, global = true, env = "GLANCE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `glance_sync=trace`. `RUST_LOG` wins when set.
    #[arg(long, global = true, env = "GLANCE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the shell, forward stdin to it and publish snapshots.
    Run(RunArgs),
    /// Print the latest snapshot tail once.
    Show(ViewArgs),
    /// Keep printing the snapshot tail as it changes.
    Watch(ViewArgs),
    /// Remove the published snapshot.
    Clear,
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    #[arg(long, env = "GLANCE_SHELL")]
    pub shell: Option<String>,
    #[arg(long, env = "GLANCE_CWD")]
    pub cwd: Option<PathBuf>,
    #[arg(long, env = "GLANCE_COLS")]
    pub cols: Option<u16>,
    #[arg(long, env = "GLANCE_ROWS")]
    pub rows: Option<u16>,
    /// Bytes of output retained.
    #[arg(long, env = "GLANCE_BUFFER_CAP")]
    pub buffer_cap: Option<usize>,
    #[arg(long, env = "GLANCE_DEBOUNCE_MS")]
    pub debounce_ms: Option<u64>,
    /// Minimum spacing between viewer wake hints.
    #[arg(long, env = "GLANCE_WAKE_INTERVAL_MS")]
    pub wake_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Args)]
pub struct ViewArgs {
    /// Lines of output to show.
    #[arg(long, short = 'n', env = "GLANCE_TAIL_LINES")]
    pub lines: Option<usize>,
    /// Refresh period when no change is reported.
    #[arg(long, env = "GLANCE_REFRESH_SECS")]
    pub refresh_secs: Option<u64>,
}

impl Cli {
    /// Apply global overrides on top of file or default settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.state_dir {
            settings.state_dir = dir.clone();
        }
    }
}

impl RunArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(shell) = &self.shell {
            settings.shell = Some(shell.clone());
        }
        if let Some(cwd) = &self.cwd {
            settings.working_dir = Some(cwd.clone());
        }
        if let Some(cols) = self.cols {
            settings.cols = cols;
        }
        if let Some(rows) = self.rows {
            settings.rows = rows;
        }
        if let Some(cap) = self.buffer_cap {
            settings.buffer_cap = cap;
        }
        if let Some(ms) = self.debounce_ms {
            settings.debounce_ms = ms;
        }
        if let Some(ms) = self.wake_interval_ms {
            settings.wake_interval_ms = ms;
        }
    }
}

impl ViewArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(lines) = self.lines {
            settings.tail_lines = lines;
        }
        if let Some(secs) = self.refresh_secs {
            settings.fallback_refresh_secs = secs;
        }
    }
}
