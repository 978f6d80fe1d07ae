use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;

use crate::decode::Utf8Carry;

/// Errors from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    /// The pseudo-terminal or the shell process could not be created.
    #[error("PTY spawn failed: {0}")]
    ForkFailure(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),
}

/// Events delivered from the reader thread to whoever owns the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PtyEvent {
    /// Shell output, decoded as UTF-8.
    DataArrived(String),
    /// The shell closed its side of the terminal. Sent exactly once per start.
    ChildExited,
}

/// How to launch the shell.
#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// Shell binary. `None` uses `$SHELL`, falling back to `/bin/sh`.
    pub shell: Option<String>,
    /// Working directory for the shell. `None` inherits ours.
    pub cwd: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
    /// Extra environment, applied after the terminal defaults.
    pub env: Vec<(String, String)>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            shell: None,
            cwd: None,
            cols: 80,
            rows: 24,
            env: Vec::new(),
        }
    }
}

/// Environment that makes interactive, color-aware programs detect a terminal.
const TERMINAL_ENV: [(&str, &str); 4] = [
    ("TERM", "xterm-256color"),
    ("COLORTERM", "truecolor"),
    ("LANG", "en_US.UTF-8"),
    ("LC_ALL", "en_US.UTF-8"),
];

/// Handles that only exist while a shell is attached.
struct Running {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    /// Cleared by the reader thread when the shell's output closes.
    reader_alive: Arc<AtomicBool>,
    /// Cleared by `stop`; a detached reader reports nothing more.
    attached: Arc<AtomicBool>,
}

/// Owns one pseudo-terminal and the shell attached to it.
///
/// Output is read on a dedicated thread and delivered as [`PtyEvent`]s over
/// the channel given to [`PtySession::new`]. Nothing else may close the
/// descriptor or wait on the child.
pub struct PtySession {
    config: ShellConfig,
    events: mpsc::UnboundedSender<PtyEvent>,
    running: Option<Running>,
    exit_code: Option<u32>,
}

impl PtySession {
    pub fn new(config: ShellConfig, events: mpsc::UnboundedSender<PtyEvent>) -> Self {
        Self {
            config,
            events,
            running: None,
            exit_code: None,
        }
    }

    /// Spawn the shell on a fresh PTY and start the reader thread.
    ///
    /// Does nothing if the shell is already running.
    pub fn start(&mut self) -> Result<(), PtyError> {
        if self.is_running() {
            return Ok(());
        }
        if self.running.is_some() {
            // Exited but never reaped.
            self.reap();
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: self.config.rows,
                cols: self.config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::ForkFailure(format!("failed to open PTY: {e}")))?;

        let shell = self.config.shell.clone().unwrap_or_else(default_shell);
        let mut cmd = CommandBuilder::new(&shell);
        for (key, value) in TERMINAL_ENV {
            cmd.env(key, value);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &self.config.cwd {
            cmd.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::ForkFailure(format!("failed to spawn {shell}: {e}")))?;
        // The child holds the only subordinate descriptor we need.
        drop(pair.slave);

        let handles = pair
            .master
            .try_clone_reader()
            .map_err(|e| format!("failed to clone reader: {e}"))
            .and_then(|reader| {
                pair.master
                    .take_writer()
                    .map(|writer| (reader, writer))
                    .map_err(|e| format!("failed to take writer: {e}"))
            });
        let (reader, writer) = match handles {
            Ok(pair) => pair,
            Err(msg) => {
                abandon(child.as_mut());
                return Err(PtyError::ForkFailure(msg));
            }
        };

        let reader_alive = Arc::new(AtomicBool::new(true));
        let attached = Arc::new(AtomicBool::new(true));
        let pid = child.process_id().unwrap_or_default();
        let spawned = std::thread::Builder::new()
            .name(format!("pty-reader-{pid}"))
            .spawn({
                let events = self.events.clone();
                let alive = Arc::clone(&reader_alive);
                let attached = Arc::clone(&attached);
                move || read_loop(reader, events, alive, attached)
            });
        if let Err(e) = spawned {
            abandon(child.as_mut());
            return Err(PtyError::ForkFailure(format!("failed to spawn reader thread: {e}")));
        }

        log::info!("started {shell} (pid {pid})");
        self.exit_code = None;
        self.running = Some(Running {
            master: pair.master,
            writer,
            child,
            reader_alive,
            attached,
        });
        Ok(())
    }

    /// Hang up the shell and block until it has been reaped.
    ///
    /// The child gets a short grace period after SIGHUP before it is killed
    /// outright. Must not be called from the reader thread. Idempotent.
    ///
    /// The stopped shell's reader is detached first, so no
    /// [`PtyEvent::ChildExited`] follows a stop and a restarted shell never
    /// sees one from its predecessor.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        running.attached.store(false, Ordering::Release);

        if let Err(e) = running.child.kill() {
            log::debug!("kill failed (child may have exited already): {e}");
        }
        match running.child.wait() {
            Ok(status) => {
                log::info!("shell stopped with exit code {}", status.exit_code());
                self.exit_code = Some(status.exit_code());
            }
            Err(e) => log::warn!("failed to reap shell: {e}"),
        }
        // Dropping the master releases the descriptor; the reader thread
        // sees end-of-stream and exits on its own.
    }

    /// Collect the exit status after [`PtyEvent::ChildExited`] and release
    /// the descriptor. Returns the exit code if one was obtained.
    ///
    /// Does nothing while the current shell's output is still open: the
    /// notice then belongs to an earlier shell. May block briefly, and for a
    /// grace period if the process outlives its output; call it off any
    /// async executor thread.
    pub fn reap(&mut self) -> Option<u32> {
        if self.is_running() {
            log::debug!("ignoring exit notice while the shell is still attached");
            return None;
        }
        let mut running = self.running.take()?;
        let code = match wait_briefly(running.child.as_mut()) {
            Ok(Some(status)) => Some(status.exit_code()),
            Ok(None) => {
                log::warn!("shell closed its output but is still running, killing it");
                if let Err(e) = running.child.kill() {
                    log::warn!("failed to kill lingering shell: {e}");
                }
                match running.child.wait() {
                    Ok(status) => Some(status.exit_code()),
                    Err(e) => {
                        log::warn!("failed to reap lingering shell: {e}");
                        None
                    }
                }
            }
            Err(e) => {
                log::warn!("failed to query shell status: {e}");
                None
            }
        };
        log::info!("shell exited with code {code:?}");
        self.exit_code = code;
        code
    }

    /// Write raw bytes to the shell. No-op if not running.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        if !self.is_running() {
            return Ok(());
        }
        if let Some(running) = self.running.as_mut() {
            running.writer.write_all(bytes)?;
            running.writer.flush()?;
        }
        Ok(())
    }

    /// Update the terminal size; the kernel delivers SIGWINCH to the shell.
    /// No-op if not running.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.config.cols = cols;
        self.config.rows = rows;
        if !self.is_running() {
            return Ok(());
        }
        match self.running.as_ref() {
            Some(running) => running
                .master
                .resize(PtySize {
                    rows,
                    cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })
                .map_err(|e| PtyError::ResizeFailed(format!("{e}"))),
            None => Ok(()),
        }
    }

    /// `true` while a shell is attached and its output has not closed.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.reader_alive.load(Ordering::Acquire))
    }

    /// OS process id of the running shell.
    pub fn process_id(&self) -> Option<u32> {
        self.running.as_ref().and_then(|running| running.child.process_id())
    }

    /// Exit code of the last shell, once it has been reaped.
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Current terminal size as (columns, rows).
    pub fn size(&self) -> (u16, u16) {
        (self.config.cols, self.config.rows)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Blocking read loop run on the reader thread.
fn read_loop(
    mut reader: Box<dyn Read + Send>,
    events: mpsc::UnboundedSender<PtyEvent>,
    alive: Arc<AtomicBool>,
    attached: Arc<AtomicBool>,
) {
    let report = |event: PtyEvent| {
        if !attached.load(Ordering::Acquire) {
            return false;
        }
        events.send(event).is_ok()
    };

    let mut buf = [0u8; 65536];
    let mut carry = Utf8Carry::new();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break, // EOF: shell closed its output
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is the usual way Linux reports a hung-up PTY.
                log::debug!("PTY read ended: {e}");
                break;
            }
        };

        let text = carry.decode(&buf[..n]);
        if text.is_empty() {
            continue;
        }
        if !report(PtyEvent::DataArrived(text)) {
            log::debug!("PTY reader detached, stopping");
            break;
        }
    }

    let tail = carry.finish();
    if !tail.is_empty() {
        report(PtyEvent::DataArrived(tail));
    }
    alive.store(false, Ordering::Release);
    report(PtyEvent::ChildExited);
}

/// Poll for the child's exit status for a short while.
///
/// The output side can close a moment before the process is reapable.
fn wait_briefly(
    child: &mut (dyn Child + Send + Sync),
) -> std::io::Result<Option<portable_pty::ExitStatus>> {
    for _ in 0..20 {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    Ok(None)
}

/// Kill and reap a child whose session could not be completed.
fn abandon(child: &mut (dyn Child + Send + Sync)) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

/// Control byte produced by Ctrl+`key` (e.g. `'c'` gives 0x03, interrupt).
pub fn control_byte(key: char) -> Option<u8> {
    match key {
        'a'..='z' | 'A'..='Z' | '@' | '[' | '\\' | ']' | '^' | '_' => {
            Some((key.to_ascii_uppercase() as u8) & 0x1f)
        }
        '?' => Some(0x7f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn sh_config() -> ShellConfig {
        ShellConfig {
            shell: Some("/bin/sh".to_string()),
            ..ShellConfig::default()
        }
    }

    /// Drain events until `done` returns true or the deadline passes.
    fn collect_until(
        rx: &mut mpsc::UnboundedReceiver<PtyEvent>,
        timeout: Duration,
        mut done: impl FnMut(&[PtyEvent]) -> bool,
    ) -> Vec<PtyEvent> {
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            match rx.try_recv() {
                Ok(event) => {
                    seen.push(event);
                    if done(&seen) {
                        break;
                    }
                }
                Err(_) => thread::sleep(Duration::from_millis(20)),
            }
        }
        seen
    }

    fn output_of(events: &[PtyEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                PtyEvent::DataArrived(text) => Some(text.as_str()),
                PtyEvent::ChildExited => None,
            })
            .collect()
    }

    #[test]
    fn test_start_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        assert!(!session.is_running());

        let result = session.start();
        assert!(result.is_ok(), "Failed to start PTY: {:?}", result.err());
        assert!(session.is_running());
        assert!(session.process_id().is_some());

        // Second start is a no-op.
        let pid = session.process_id();
        session.start().unwrap();
        assert_eq!(session.process_id(), pid);
    }

    #[test]
    fn test_echo_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        session.start().unwrap();

        session.send(b"echo GLANCE_TEST_OK\n").unwrap();

        let events = collect_until(&mut rx, Duration::from_secs(5), |seen| {
            // The command itself is echoed back; wait for the output line too.
            output_of(seen).matches("GLANCE_TEST_OK").count() >= 2
        });
        let text = output_of(&events);
        assert!(
            text.contains("GLANCE_TEST_OK"),
            "Expected output to contain GLANCE_TEST_OK, got: {text}"
        );
    }

    #[test]
    fn test_terminal_environment() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        session.start().unwrap();

        session.send(b"echo \"T=$TERM\"\n").unwrap();
        let events = collect_until(&mut rx, Duration::from_secs(5), |seen| {
            output_of(seen).contains("T=xterm-256color")
        });
        assert!(output_of(&events).contains("T=xterm-256color"));
    }

    #[test]
    fn test_resize() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        session.start().unwrap();

        let result = session.resize(120, 40);
        assert!(result.is_ok(), "Resize failed: {:?}", result.err());
        assert_eq!(session.size(), (120, 40));
    }

    #[test]
    fn test_resize_reaches_shell() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        session.start().unwrap();

        session.resize(120, 40).unwrap();
        session.send(b"stty size\n").unwrap();

        let events = collect_until(&mut rx, Duration::from_secs(5), |seen| {
            output_of(seen).contains("40 120")
        });
        let text = output_of(&events);
        assert!(text.contains("40 120"), "stty did not see the new size: {text}");
    }

    #[test]
    fn test_child_exit_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        session.start().unwrap();

        session.send(b"exit 0\n").unwrap();

        let events = collect_until(&mut rx, Duration::from_secs(5), |seen| {
            seen.last() == Some(&PtyEvent::ChildExited)
        });
        assert_eq!(events.last(), Some(&PtyEvent::ChildExited));
        assert!(!session.is_running());

        assert_eq!(session.reap(), Some(0));
        assert_eq!(session.exit_code(), Some(0));
        assert!(session.process_id().is_none());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        session.start().unwrap();

        session.stop();
        assert!(!session.is_running());
        assert!(session.exit_code().is_some());
        session.stop();

        // A stopped shell's reader is detached and reports no exit.
        let events = collect_until(&mut rx, Duration::from_millis(500), |seen| {
            seen.contains(&PtyEvent::ChildExited)
        });
        assert!(!events.contains(&PtyEvent::ChildExited));
    }

    #[test]
    fn test_send_and_resize_when_stopped_are_noops() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        assert!(session.send(b"echo nope\n").is_ok());
        assert!(session.resize(100, 30).is_ok());
    }

    #[test]
    fn test_restart_after_stop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        session.start().unwrap();
        session.stop();
        session.start().unwrap();
        let pid = session.process_id();

        let events = collect_until(&mut rx, Duration::from_secs(1), |seen| {
            seen.contains(&PtyEvent::ChildExited)
        });
        assert!(!events.contains(&PtyEvent::ChildExited));
        assert!(session.is_running());
        assert_eq!(session.process_id(), pid);
    }

    #[test]
    fn test_reap_ignores_exit_notice_while_attached() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(sh_config(), tx);
        session.start().unwrap();
        let pid = session.process_id();

        assert_eq!(session.reap(), None);
        assert!(session.is_running());
        assert_eq!(session.process_id(), pid);

        assert!(session.send(b"echo still here\n").is_ok());
        session.stop();
    }

    #[test]
    fn test_missing_shell_is_fork_failure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = ShellConfig {
            shell: Some("/nonexistent/glance-shell".to_string()),
            ..ShellConfig::default()
        };
        let mut session = PtySession::new(config, tx);
        let err = session.start().unwrap_err();
        assert!(matches!(err, PtyError::ForkFailure(_)), "got {err:?}");
        assert!(!session.is_running());
    }

    #[test]
    fn test_default_shell_detection() {
        let shell = default_shell();
        assert!(!shell.is_empty(), "Default shell should not be empty");
        assert!(
            shell.starts_with('/'),
            "Default shell should be an absolute path, got: {shell}"
        );
    }

    #[test]
    fn test_control_byte() {
        assert_eq!(control_byte('c'), Some(0x03));
        assert_eq!(control_byte('C'), Some(0x03));
        assert_eq!(control_byte('d'), Some(0x04));
        assert_eq!(control_byte('['), Some(0x1b));
        assert_eq!(control_byte('?'), Some(0x7f));
        assert_eq!(control_byte('1'), None);
    }
}
