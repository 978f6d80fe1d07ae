//! glance-vt: escape-sequence interpreter for Glance.
//!
//! Turns raw shell output into styled text runs. Only SGR (color and
//! attribute) sequences are interpreted; every other control sequence is
//! recognized by the `vte` state machine and dropped.

pub mod interpreter;
pub mod palette;
pub mod style;

pub use interpreter::{last_lines, parse, parse_tail, strip_codes, EscapeInterpreter, Signal};
pub use style::{plain_text, push_run, render_ansi, Rgb, StyleFlags, StyleState, StyledRun};
