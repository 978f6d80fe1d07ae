//! glance-app: the producer side of Glance plus the `glance` binary's
//! building blocks.
//!
//! A [`coordinator::Coordinator`] task owns the shell session and the
//! bounded [`buffer::OutputBuffer`], feeds styled output to the interactive
//! view and publishes debounced snapshots through [`publisher::Publisher`].

pub mod buffer;
pub mod cli;
pub mod commands;
pub mod coordinator;
pub mod debounce;
pub mod publisher;
pub mod settings;
