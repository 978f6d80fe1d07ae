//! Bounded shell output, kept both raw (for snapshots) and styled (for the
//! interactive view).

use std::collections::VecDeque;

use glance_vt::{EscapeInterpreter, Signal, StyledRun};

/// Default number of bytes retained.
pub const DEFAULT_CAP: usize = 50_000;

/// Raw output text capped at `cap` bytes, dropping the oldest output first.
///
/// The retained text is always a suffix of everything appended. A cut never
/// splits a UTF-8 character or lands inside an escape sequence, however long
/// the sequence is.
#[derive(Debug)]
pub struct RawOutputBuffer {
    text: String,
    cap: usize,
    /// Head of a sequence that was cut while still open. Its remainder is
    /// discarded from later appends up to the terminator.
    open_head: Option<Vec<u8>>,
}

impl RawOutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            text: String::new(),
            cap,
            open_head: None,
        }
    }

    pub fn append(&mut self, chunk: &str) {
        let chunk = self.skip_cut_sequence(chunk);
        self.text.push_str(chunk);
        if self.text.len() > self.cap {
            match front_cut(&self.text, self.text.len() - self.cap) {
                Cut::At(cut) => {
                    self.text.drain(..cut);
                }
                Cut::Open(esc) => {
                    self.open_head = Some(sequence_head(&self.text.as_bytes()[esc..]));
                    self.text.clear();
                }
            }
        }
    }

    /// Drop the rest of a sequence whose start was already cut away.
    fn skip_cut_sequence<'a>(&mut self, chunk: &'a str) -> &'a str {
        let Some(head) = self.open_head.take() else {
            return chunk;
        };
        let mut joined = head.clone();
        joined.extend_from_slice(chunk.as_bytes());
        match sequence_len(&joined) {
            // Sequences end on an ASCII byte, so this is a character boundary.
            Some(len) => &chunk[len.saturating_sub(head.len())..],
            None => {
                self.open_head = Some(sequence_head(&joined));
                ""
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.open_head = None;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Cut {
    /// Drop everything before this offset.
    At(usize),
    /// The cut falls in a sequence that starts here and is not terminated yet.
    Open(usize),
}

/// Smallest cut `>= min_cut` on a character boundary outside any escape
/// sequence.
///
/// The retained text always starts outside a sequence, so walking forward
/// from the front sees every sequence whole. The walk covers only the bytes
/// being dropped.
fn front_cut(text: &str, min_cut: usize) -> Cut {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < min_cut {
        if bytes[i] == 0x1b {
            match sequence_len(&bytes[i..]) {
                Some(len) => i += len,
                None => return Cut::Open(i),
            }
        } else {
            i += 1;
            while !text.is_char_boundary(i) {
                i += 1;
            }
        }
    }
    Cut::At(i)
}

/// What to remember of an open sequence: its introducer, plus a trailing ESC
/// that may be the first half of a string terminator.
fn sequence_head(seq: &[u8]) -> Vec<u8> {
    let mut head = seq[..seq.len().min(2)].to_vec();
    if seq.len() > 2 && seq.last() == Some(&0x1b) {
        head.push(0x1b);
    }
    head
}

/// Length of the escape sequence at the start of `bytes`, if it is complete.
fn sequence_len(bytes: &[u8]) -> Option<usize> {
    match *bytes.get(1)? {
        b'[' => bytes[2..]
            .iter()
            .position(|b| (0x40..=0x7e).contains(b))
            .map(|i| i + 3),
        b']' => string_len(&bytes[2..], true).map(|n| n + 2),
        b'P' | b'X' | b'^' | b'_' => string_len(&bytes[2..], false).map(|n| n + 2),
        // Intermediates, e.g. `ESC ( B`.
        0x20..=0x2f => bytes[2..]
            .iter()
            .position(|b| (0x30..=0x7e).contains(b))
            .map(|i| i + 3),
        // A stray ESC before non-ASCII text is just the ESC.
        0x80.. => Some(1),
        _ => Some(2),
    }
}

/// Length of a control-string body including its terminator (ST, or BEL
/// when `bel` is set).
fn string_len(body: &[u8], bel: bool) -> Option<usize> {
    body.iter().enumerate().find_map(|(i, &b)| match b {
        0x07 if bel => Some(i + 1),
        0x1b if body.get(i + 1) == Some(&b'\\') => Some(i + 2),
        _ => None,
    })
}

/// Shell output for the session: raw text plus the incrementally
/// interpreted runs shown by the interactive view.
///
/// Each chunk is scanned once; the interpreter carries the pen across
/// chunks. The styled view is capped at the same length in plain text.
pub struct OutputBuffer {
    raw: RawOutputBuffer,
    interpreter: EscapeInterpreter,
    runs: VecDeque<StyledRun>,
    display_len: usize,
}

impl OutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            raw: RawOutputBuffer::new(cap),
            interpreter: EscapeInterpreter::new(),
            runs: VecDeque::new(),
            display_len: 0,
        }
    }

    /// Append a chunk of output and return the runs it produced.
    pub fn append(&mut self, chunk: &str) -> Vec<StyledRun> {
        self.raw.append(chunk);

        let fresh = self.interpreter.feed(chunk.as_bytes());
        for run in &fresh {
            self.display_len += run.text.len();
            match self.runs.back_mut() {
                Some(last) if last.style == run.style => last.text.push_str(&run.text),
                _ => self.runs.push_back(run.clone()),
            }
        }
        self.trim_display();
        fresh
    }

    fn trim_display(&mut self) {
        let cap = self.raw.cap();
        while self.display_len > cap {
            let excess = self.display_len - cap;
            let Some(front) = self.runs.front_mut() else {
                break;
            };
            if front.text.len() <= excess {
                self.display_len -= front.text.len();
                self.runs.pop_front();
            } else {
                let mut cut = excess;
                while !front.text.is_char_boundary(cut) {
                    cut += 1;
                }
                front.text.drain(..cut);
                self.display_len -= cut;
            }
        }
    }

    /// Retained raw output, escape sequences included.
    pub fn raw(&self) -> &str {
        self.raw.as_str()
    }

    pub fn runs(&self) -> impl Iterator<Item = &StyledRun> {
        self.runs.iter()
    }

    /// The full styled-run sequence for the retained output.
    pub fn styled_runs(&self) -> Vec<StyledRun> {
        self.runs.iter().cloned().collect()
    }

    /// Length in bytes of the displayed plain text.
    pub fn display_len(&self) -> usize {
        self.display_len
    }

    /// OSC signals seen since the last call.
    pub fn take_signals(&mut self) -> Vec<Signal> {
        self.interpreter.take_signals()
    }

    /// Drop all output and start again from the default pen.
    pub fn clear(&mut self) {
        self.raw.clear();
        self.interpreter.reset();
        self.runs.clear();
        self.display_len = 0;
    }
}
