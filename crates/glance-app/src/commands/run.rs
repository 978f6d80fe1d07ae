//! `glance run`: host the shell in this terminal and publish snapshots.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use glance_vt::render_ansi;
use tokio::io::AsyncWriteExt;

use crate::coordinator::{Coordinator, DisplayEvent, SessionHandle};
use crate::settings::Settings;

/// Run the shell until it exits or stdin closes. Returns its exit code.
pub async fn run(settings: Settings) -> anyhow::Result<Option<u32>> {
    let channel = Arc::new(settings.snapshot_channel());
    // Unsynced is not fatal; each publish retries the write.
    if let Err(e) = channel.provision() {
        log::warn!("snapshots unavailable for now: {e}");
    }

    let (coordinator, handle, mut display) =
        Coordinator::start(&settings, Arc::clone(&channel)).context("failed to start shell")?;
    log::info!("publishing snapshots to {}", channel.record_path().display());

    let task = tokio::spawn(coordinator.run());
    forward_stdin(handle)?;

    let mut stdout = tokio::io::stdout();
    while let Some(event) = display.recv().await {
        match event {
            DisplayEvent::Appended(runs) => {
                stdout.write_all(render_ansi(&runs).as_bytes()).await?;
                stdout.flush().await?;
            }
            DisplayEvent::Cleared => {
                stdout.write_all(b"\x1b[2J\x1b[H").await?;
                stdout.flush().await?;
            }
            DisplayEvent::Exited(code) => {
                log::info!("shell exited (code {code:?})");
                break;
            }
        }
    }

    task.await.context("coordinator task failed")
}

/// Forward stdin lines on a plain thread; tokio's stdin can hold shutdown
/// hostage on a pending read.
///
/// The handle is dropped at end of input, which stops the shell.
fn forward_stdin(handle: SessionHandle) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("stdin-forwarder".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("stdin read failed: {e}");
                        break;
                    }
                };
                if handle.send_line(line).is_err() {
                    return;
                }
            }
            log::debug!("stdin closed");
        })
        .context("failed to spawn stdin thread")?;
    Ok(())
}
