//! glance-pty: pseudo-terminal session management for Glance.
//!
//! Hosts a shell on a PTY as if it were attached to a real terminal. Output
//! is read on a dedicated thread and handed to the owner as typed events
//! over a channel; input, resize and teardown go through [`PtySession`].
//!
//! # Architecture
//!
//! - [`PtySession`]: Spawn, write, resize, stop and reap one shell.
//! - [`PtyEvent`]: What the reader thread reports (`DataArrived`, `ChildExited`).
//! - [`Utf8Carry`]: Decodes the chunked output without splitting characters.

pub mod decode;
pub mod pty;

pub use decode::Utf8Carry;
pub use pty::{control_byte, default_shell, PtyError, PtyEvent, PtySession, ShellConfig};
