//! The single coordination task that owns the session, the output buffer and
//! the publisher.
//!
//! The PTY reader thread never touches shared state: it hands each chunk to
//! this task as a [`PtyEvent`]. Front ends talk to the task through a
//! [`SessionHandle`] and receive [`DisplayEvent`]s back, so every mutation of
//! the buffer happens here, one at a time.

use std::sync::Arc;

use glance_pty::{control_byte, PtyError, PtyEvent, PtySession};
use glance_sync::{Snapshot, SnapshotChannel};
use glance_vt::{Signal, StyledRun};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use crate::buffer::OutputBuffer;
use crate::publisher::Publisher;
use crate::settings::Settings;

/// Requests from the interactive view.
#[derive(Debug)]
pub enum Command {
    /// Raw bytes, forwarded as-is.
    Input(Vec<u8>),
    /// A line of text followed by Enter. Marks a command as executing.
    Line(String),
    /// Ctrl + the given key, e.g. `'c'` for interrupt.
    Control(char),
    Resize { cols: u16, rows: u16 },
    /// Empty the buffer and publish right away.
    Clear,
    /// Hang up the shell; the reply carries its exit code.
    Stop(oneshot::Sender<Option<u32>>),
}

/// Updates for the interactive view.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayEvent {
    /// Runs produced by newly arrived output, in order.
    Appended(Vec<StyledRun>),
    /// The buffer was emptied.
    Cleared,
    /// The shell is gone; no further events follow.
    Exited(Option<u32>),
}

/// Returned when the coordination task has already finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed;

impl std::fmt::Display for SessionClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "terminal session has ended")
    }
}

impl std::error::Error for SessionClosed {}

/// Cloneable front-end handle to a running [`Coordinator`].
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    fn send(&self, command: Command) -> Result<(), SessionClosed> {
        self.commands.send(command).map_err(|_| SessionClosed)
    }

    pub fn send_input(&self, bytes: impl Into<Vec<u8>>) -> Result<(), SessionClosed> {
        self.send(Command::Input(bytes.into()))
    }

    pub fn send_line(&self, line: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(Command::Line(line.into()))
    }

    pub fn send_control(&self, key: char) -> Result<(), SessionClosed> {
        self.send(Command::Control(key))
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), SessionClosed> {
        self.send(Command::Resize { cols, rows })
    }

    pub fn clear(&self) -> Result<(), SessionClosed> {
        self.send(Command::Clear)
    }

    /// Stop the shell and wait for it to be reaped.
    pub async fn stop(&self) -> Result<Option<u32>, SessionClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Stop(reply_tx))?;
        reply_rx.await.map_err(|_| SessionClosed)
    }
}

pub struct Coordinator {
    session: Option<PtySession>,
    pty_events: mpsc::UnboundedReceiver<PtyEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    display: mpsc::UnboundedSender<DisplayEvent>,
    buffer: OutputBuffer,
    publisher: Publisher,
    working_directory: String,
    executing: bool,
    exit_code: Option<u32>,
}

impl Coordinator {
    /// Start the configured shell and build a coordinator around it.
    ///
    /// Spawn [`run`](Self::run) to begin processing.
    pub fn start(
        settings: &Settings,
        channel: Arc<SnapshotChannel>,
    ) -> Result<(Self, SessionHandle, mpsc::UnboundedReceiver<DisplayEvent>), PtyError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut session = PtySession::new(settings.shell_config(), event_tx);
        session.start()?;

        Ok(Self::new(
            session,
            event_rx,
            OutputBuffer::new(settings.buffer_cap),
            Publisher::new(channel, settings.debounce()),
            settings.initial_directory(),
        ))
    }

    /// Build a coordinator around an existing session and its event stream.
    pub fn new(
        session: PtySession,
        pty_events: mpsc::UnboundedReceiver<PtyEvent>,
        buffer: OutputBuffer,
        publisher: Publisher,
        working_directory: String,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (display_tx, display_rx) = mpsc::unbounded_channel();

        let coordinator = Self {
            session: Some(session),
            pty_events,
            commands: command_rx,
            display: display_tx,
            buffer,
            publisher,
            working_directory,
            executing: false,
            exit_code: None,
        };
        let handle = SessionHandle {
            commands: command_tx,
        };
        (coordinator, handle, display_rx)
    }

    /// Process events until the shell exits or is stopped.
    ///
    /// Returns the shell's exit code, if one was collected.
    pub async fn run(mut self) -> Option<u32> {
        loop {
            let deadline = self.publisher.deadline();
            tokio::select! {
                event = self.pty_events.recv() => match event {
                    Some(PtyEvent::DataArrived(text)) => self.on_output_arrived(&text),
                    Some(PtyEvent::ChildExited) | None => {
                        if self.on_child_exited().await {
                            break;
                        }
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Stop(reply)) => {
                        self.stop_session().await;
                        let _ = reply.send(self.exit_code);
                        break;
                    }
                    Some(command) => self.on_command(command),
                    None => {
                        log::debug!("all session handles dropped, stopping shell");
                        self.stop_session().await;
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.publisher.take_due(Instant::now()) {
                        self.publish_now();
                    }
                }
            }
        }
        self.exit_code
    }

    fn on_output_arrived(&mut self, text: &str) {
        let runs = self.buffer.append(text);
        for signal in self.buffer.take_signals() {
            self.apply_signal(signal);
        }
        if !runs.is_empty() {
            let _ = self.display.send(DisplayEvent::Appended(runs));
        }
        self.publisher.schedule();
    }

    fn apply_signal(&mut self, signal: Signal) {
        match signal {
            Signal::WorkingDirectory(dir) => self.working_directory = dir,
            Signal::PromptMark => self.executing = false,
            Signal::Title(title) => log::debug!("shell title: {title}"),
        }
    }

    fn on_command(&mut self, command: Command) {
        let result = match command {
            Command::Input(bytes) => self.send(&bytes),
            Command::Line(line) => {
                if self.session.as_ref().is_some_and(PtySession::is_running) {
                    self.executing = true;
                }
                let mut bytes = line.into_bytes();
                bytes.push(b'\r');
                self.send(&bytes)
            }
            Command::Control(key) => match control_byte(key) {
                Some(byte) => self.send(&[byte]),
                None => {
                    log::warn!("no control byte for {key:?}");
                    Ok(())
                }
            },
            Command::Resize { cols, rows } => match self.session.as_mut() {
                Some(session) => session.resize(cols, rows),
                None => Ok(()),
            },
            Command::Clear => {
                self.clear();
                Ok(())
            }
            Command::Stop(reply) => {
                // Stop is handled by `run`; answer rather than leave it hanging.
                let _ = reply.send(self.exit_code);
                Ok(())
            }
        };
        if let Err(e) = result {
            log::warn!("session command failed: {e}");
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        match self.session.as_mut() {
            Some(session) => session.send(bytes),
            None => Ok(()),
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
        let _ = self.display.send(DisplayEvent::Cleared);
        self.publish_now();
    }

    /// Returns `false` if the notice is stale and the shell is still up.
    async fn on_child_exited(&mut self) -> bool {
        if self.session.as_ref().is_some_and(PtySession::is_running) {
            log::debug!("ignoring exit notice while the shell is still attached");
            return false;
        }
        // Reaping can wait out a shell that outlives its output.
        if let Some(mut session) = self.session.take() {
            match tokio::task::spawn_blocking(move || {
                let code = session.reap();
                (session, code)
            })
            .await
            {
                Ok((session, code)) => {
                    if code.is_some() {
                        self.exit_code = code;
                    }
                    self.session = Some(session);
                }
                Err(e) => log::error!("reaping the shell failed: {e}"),
            }
        }
        self.executing = false;
        self.publish_now();
        let _ = self.display.send(DisplayEvent::Exited(self.exit_code));
        true
    }

    /// Run the blocking stop off this task so output delivery never stalls
    /// behind a shell that ignores SIGHUP.
    async fn stop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            match tokio::task::spawn_blocking(move || {
                session.stop();
                session
            })
            .await
            {
                Ok(session) => {
                    self.exit_code = session.exit_code();
                    self.session = Some(session);
                }
                Err(e) => log::error!("stopping the shell failed: {e}"),
            }
        }
        self.executing = false;
        self.publish_now();
        let _ = self.display.send(DisplayEvent::Exited(self.exit_code));
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.buffer.raw(), self.working_directory.as_str(), self.executing)
    }

    fn publish_now(&mut self) {
        let snapshot = self.snapshot();
        self.publisher.publish_now(&snapshot);
    }
}
