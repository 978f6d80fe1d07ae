//! Secondary-viewer subcommands: `show`, `watch` and `clear`.

use std::io::Write;
use std::sync::mpsc::RecvTimeoutError;

use anyhow::Context;
use chrono::{DateTime, Utc};
use glance_sync::{load_frame, watch_snapshots, NoopWakeHint, SnapshotChannel, ViewerFrame};
use glance_vt::render_ansi;

use crate::settings::Settings;

/// Viewers never publish, so they carry no wake hint.
fn viewer_channel(settings: &Settings) -> SnapshotChannel {
    SnapshotChannel::new(&settings.state_dir, Box::new(NoopWakeHint))
}

/// Text for one frame: the output tail, then a dim status line.
pub fn render_frame(frame: &ViewerFrame, now: DateTime<Utc>) -> String {
    let mut out = render_ansi(&frame.runs);
    if !out.is_empty() && !glance_vt::plain_text(&frame.runs).ends_with('\n') {
        out.push('\n');
    }
    let state = if frame.executing { "running" } else { "idle" };
    out.push_str(&format!(
        "\x1b[2m{} | {} | {}\x1b[0m\n",
        frame.working_directory,
        state,
        frame.updated_label(now)
    ));
    out
}

fn current_text(channel: &SnapshotChannel, tail_lines: usize) -> String {
    match load_frame(channel, tail_lines) {
        Ok(Some(frame)) => render_frame(&frame, Utc::now()),
        Ok(None) => "no snapshot yet\n".to_string(),
        Err(e) => {
            log::warn!("failed to load snapshot: {e}");
            format!("snapshot unavailable: {e}\n")
        }
    }
}

pub fn show(settings: &Settings) -> anyhow::Result<()> {
    let channel = viewer_channel(settings);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(current_text(&channel, settings.tail_lines).as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Redraw on every record change or wake hint, and at least once per
/// fallback period. Runs until interrupted.
pub fn watch(settings: &Settings) -> anyhow::Result<()> {
    let channel = viewer_channel(settings);
    channel.provision().context("cannot watch snapshot directory")?;
    let (events, _watcher) = watch_snapshots(channel.dir())?;
    let refresh = settings.fallback_refresh();

    loop {
        let text = current_text(&channel, settings.tail_lines);
        {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(b"\x1b[2J\x1b[H")?;
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }

        match events.recv_timeout(refresh) {
            Ok(event) => {
                log::debug!("snapshot event: {event:?}");
                // One redraw covers a burst.
                while events.try_recv().is_ok() {}
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => anyhow::bail!("snapshot watcher stopped"),
        }
    }
}

pub fn clear(settings: &Settings) -> anyhow::Result<()> {
    let channel = viewer_channel(settings);
    channel.clear()?;
    log::info!("removed {}", channel.record_path().display());
    Ok(())
}
