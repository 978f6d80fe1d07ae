use vte::{Params, Parser, Perform};

use crate::palette;
use crate::style::{push_run, Rgb, StyleFlags, StyleState, StyledRun};

/// Side-channel information reported by the shell through OSC sequences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// OSC 0 / OSC 2 window title.
    Title(String),
    /// OSC 7 working directory report, already decoded to a path.
    WorkingDirectory(String),
    /// OSC 133 `A` or `D`: the shell is (about to be) showing a prompt.
    PromptMark,
}

/// Collects styled text and signals while the VTE parser scans bytes.
#[derive(Default)]
struct RunSink {
    style: StyleState,
    runs: Vec<StyledRun>,
    signals: Vec<Signal>,
}

impl RunSink {
    fn push_char(&mut self, c: char) {
        match self.runs.last_mut() {
            Some(run) if run.style == self.style => run.text.push(c),
            _ => self.runs.push(StyledRun::new(c.to_string(), self.style)),
        }
    }

    fn apply_sgr(&mut self, params: &Params) {
        let groups: Vec<&[u16]> = params.iter().collect();
        if groups.is_empty() {
            self.style = StyleState::default();
            return;
        }

        let mut i = 0;
        while i < groups.len() {
            let group = groups[i];
            let code = group.first().copied().unwrap_or(0);
            match code {
                0 => self.style = StyleState::default(),
                1 => self.style.flags.insert(StyleFlags::BOLD),
                2 => self.style.flags.insert(StyleFlags::DIM),
                3 => self.style.flags.insert(StyleFlags::ITALIC),
                4 => self.style.flags.insert(StyleFlags::UNDERLINE),
                22 => self.style.flags.remove(StyleFlags::BOLD | StyleFlags::DIM),
                23 => self.style.flags.remove(StyleFlags::ITALIC),
                24 => self.style.flags.remove(StyleFlags::UNDERLINE),
                30..=37 => self.style.fg = Some(palette::standard((code - 30) as u8)),
                39 => self.style.fg = None,
                40..=47 => self.style.bg = Some(palette::standard((code - 40) as u8)),
                49 => self.style.bg = None,
                90..=97 => self.style.fg = Some(palette::bright((code - 90) as u8)),
                100..=107 => self.style.bg = Some(palette::bright((code - 100) as u8)),
                38 | 48 => {
                    // Colon form keeps the sub-parameters in the same group;
                    // semicolon form spreads them over the following groups.
                    let (color, consumed) = if group.len() > 1 {
                        (extended_color(&group[1..]).0, 0)
                    } else {
                        let rest: Vec<u16> = groups[i + 1..]
                            .iter()
                            .take(4)
                            .map(|g| g.first().copied().unwrap_or(0))
                            .collect();
                        extended_color(&rest)
                    };
                    if let Some(color) = color {
                        if code == 38 {
                            self.style.fg = Some(color);
                        } else {
                            self.style.bg = Some(color);
                        }
                    }
                    i += consumed;
                }
                _ => {}
            }
            i += 1;
        }
    }

    fn handle_osc(&mut self, params: &[&[u8]]) {
        let Some(kind) = params.first() else {
            return;
        };
        match *kind {
            b"0" | b"2" => {
                let title = params[1..]
                    .iter()
                    .map(|p| String::from_utf8_lossy(p))
                    .collect::<Vec<_>>()
                    .join(";");
                self.signals.push(Signal::Title(title));
            }
            b"7" => {
                if let Some(path) = params.get(1).and_then(|url| file_url_path(url)) {
                    self.signals.push(Signal::WorkingDirectory(path));
                }
            }
            b"133" => {
                if let Some(mark) = params.get(1) {
                    if mark.starts_with(b"A") || mark.starts_with(b"D") {
                        self.signals.push(Signal::PromptMark);
                    }
                }
            }
            _ => {}
        }
    }
}

impl Perform for RunSink {
    fn print(&mut self, c: char) {
        self.push_char(c);
    }

    fn execute(&mut self, byte: u8) {
        if let Some(c) = kept_control(byte) {
            self.push_char(c);
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if action == 'm' && intermediates.is_empty() {
            if ignore {
                log::debug!("SGR has too many parameters, applying the first {}", params.len());
            }
            self.apply_sgr(params);
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        self.handle_osc(params);
    }
}

/// Streaming escape-sequence interpreter.
///
/// The pen and any partially received escape sequence (or UTF-8 character)
/// persist across [`feed`](Self::feed) calls, so a growing stream is scanned
/// exactly once.
pub struct EscapeInterpreter {
    parser: Parser,
    sink: RunSink,
}

impl EscapeInterpreter {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            sink: RunSink::default(),
        }
    }

    /// Scan newly arrived bytes and return the styled runs they produce.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StyledRun> {
        self.parser.advance(&mut self.sink, bytes);
        std::mem::take(&mut self.sink.runs)
    }

    /// The pen that will be applied to the next printed character.
    pub fn style(&self) -> StyleState {
        self.sink.style
    }

    /// Drain OSC signals seen since the last call.
    pub fn take_signals(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.sink.signals)
    }

    /// Return to the default pen and drop any partial sequence.
    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.sink = RunSink::default();
    }
}

impl Default for EscapeInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a complete string against a fresh interpreter.
pub fn parse(text: &str) -> Vec<StyledRun> {
    EscapeInterpreter::new().feed(text.as_bytes())
}

/// Collects only printable text; escape sequences are dropped uninterpreted.
#[derive(Default)]
struct Stripper {
    out: String,
}

impl Perform for Stripper {
    fn print(&mut self, c: char) {
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if let Some(c) = kept_control(byte) {
            self.out.push(c);
        }
    }
}

/// Remove all escape sequences from `text` without interpreting them.
pub fn strip_codes(text: &str) -> String {
    let mut parser: Parser = Parser::new();
    let mut stripper = Stripper::default();
    parser.advance(&mut stripper, text.as_bytes());
    stripper.out
}

/// The suffix of `text` holding its last `k` lines.
///
/// A trailing newline terminates the last line rather than starting an
/// empty one.
pub fn last_lines(text: &str, k: usize) -> &str {
    if k == 0 {
        return "";
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    match body.rmatch_indices('\n').nth(k - 1) {
        Some((pos, _)) => &text[pos + 1..],
        None => text,
    }
}

/// Parse only the last `k` lines of `text`.
pub fn parse_tail(text: &str, k: usize) -> Vec<StyledRun> {
    let mut runs = Vec::new();
    for run in parse(last_lines(text, k)) {
        push_run(&mut runs, run);
    }
    runs
}

/// C0 controls that survive as text. Everything else is dropped.
fn kept_control(byte: u8) -> Option<char> {
    match byte {
        b'\n' => Some('\n'),
        b'\t' => Some('\t'),
        _ => None,
    }
}

/// Resolve the values following a `38`/`48` code.
///
/// Returns the color (if supported) and how many values were consumed.
/// `5;N` selects from the 256-color palette. `2;r;g;b` is consumed but
/// left unsupported.
fn extended_color(rest: &[u16]) -> (Option<Rgb>, usize) {
    match rest.first() {
        Some(5) => match rest.get(1) {
            Some(&n) if n <= 255 => (Some(palette::indexed(n as u8)), 2),
            Some(_) => (None, 2),
            None => (None, 1),
        },
        Some(2) => (None, rest.len().min(4)),
        _ => (None, 0),
    }
}

/// Decode an OSC 7 `file://host/path` URL into a path.
fn file_url_path(url: &[u8]) -> Option<String> {
    let url = std::str::from_utf8(url).ok()?;
    let rest = url.strip_prefix("file://")?;
    let path = &rest[rest.find('/')?..];
    Some(percent_decode(path))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::plain_text;

    fn red() -> Rgb {
        palette::standard(1)
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        for input in ["hello", "a b c", "tabs\tand\nnewlines", "ünïcødé ✓", ""] {
            let runs = parse(input);
            assert_eq!(plain_text(&runs), input);
            assert!(runs.iter().all(|r| r.style.is_default()));
            assert!(runs.len() <= 1);
        }
    }

    #[test]
    fn test_red_then_plain() {
        let runs = parse("\x1b[31mRed \x1b[0mPlain");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "Red ");
        assert_eq!(runs[0].style.fg, Some(red()));
        assert_eq!(runs[1].text, "Plain");
        assert!(runs[1].style.is_default());
    }

    #[test]
    fn test_empty_sgr_is_reset() {
        let runs = parse("\x1b[1;4mA\x1b[mB");
        assert!(runs[0].style.bold());
        assert!(runs[0].style.underline());
        assert!(runs[1].style.is_default());
    }

    #[test]
    fn test_attribute_cancel_codes() {
        let mut interp = EscapeInterpreter::new();
        interp.feed(b"\x1b[1;2;3;4m");
        let style = interp.style();
        assert!(style.bold() && style.dim() && style.italic() && style.underline());

        interp.feed(b"\x1b[22m");
        assert!(!interp.style().bold());
        assert!(!interp.style().dim());
        assert!(interp.style().italic());

        interp.feed(b"\x1b[23;24m");
        assert!(interp.style().is_default());
    }

    #[test]
    fn test_default_colors() {
        let mut interp = EscapeInterpreter::new();
        interp.feed(b"\x1b[31;42m");
        assert_eq!(interp.style().fg, Some(red()));
        assert_eq!(interp.style().bg, Some(palette::standard(2)));
        interp.feed(b"\x1b[39m");
        assert_eq!(interp.style().fg, None);
        interp.feed(b"\x1b[49m");
        assert!(interp.style().is_default());
    }

    #[test]
    fn test_bright_colors() {
        let runs = parse("\x1b[91;104mX");
        assert_eq!(runs[0].style.fg, Some(palette::bright(1)));
        assert_eq!(runs[0].style.bg, Some(palette::bright(4)));
    }

    #[test]
    fn test_256_color_semicolon_and_colon_forms() {
        let runs = parse("\x1b[38;5;196mA\x1b[48:5:232mB");
        assert_eq!(runs[0].style.fg, Some(Rgb::new(255, 0, 0)));
        assert_eq!(runs[1].style.bg, Some(Rgb::new(8, 8, 8)));
        assert_eq!(runs[1].style.fg, Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn test_256_color_followed_by_more_codes() {
        let runs = parse("\x1b[38;5;21;1mX");
        assert_eq!(runs[0].style.fg, Some(palette::indexed(21)));
        assert!(runs[0].style.bold());
    }

    #[test]
    fn test_truecolor_is_consumed_without_effect() {
        let runs = parse("\x1b[38;2;10;20;30;4mX");
        assert_eq!(runs[0].style.fg, None);
        assert!(runs[0].style.underline());
    }

    #[test]
    fn test_unrecognized_sequences_are_dropped() {
        let runs = parse("a\x1b[2Jb\x1b[?25lc\x1b[10;5Hd\x1b]0;title\x07e");
        assert_eq!(plain_text(&runs), "abcde");
        assert!(runs.iter().all(|r| r.style.is_default()));
    }

    #[test]
    fn test_reset_prefix_is_idempotent() {
        let inputs = ["plain", "\x1b[1mbold\x1b[0m", "\x1b[32mgreen\x1b[4mboth"];
        for input in inputs {
            let with_reset = format!("\x1b[0m{input}");
            assert_eq!(parse(&with_reset), parse(input));
        }
    }

    #[test]
    fn test_strip_matches_parse_text() {
        let inputs = [
            "\x1b[31mRed \x1b[0mPlain",
            "no codes",
            "\x1b[38;5;100mx\x1b[Ky\r\n\x07z",
            "\x1b]7;file:///tmp\x1b\\after",
            "trailing \x1b[3",
        ];
        for input in inputs {
            assert_eq!(plain_text(&parse(input)), strip_codes(input), "input {input:?}");
        }
    }

    #[test]
    fn test_carriage_return_and_bell_are_dropped() {
        assert_eq!(strip_codes("one\r\ntwo\x07"), "one\ntwo");
    }

    #[test]
    fn test_style_persists_across_feeds() {
        let mut interp = EscapeInterpreter::new();
        let first = interp.feed(b"\x1b[31mre");
        let second = interp.feed(b"d text");
        assert_eq!(first[0].style.fg, Some(red()));
        assert_eq!(second[0].text, "d text");
        assert_eq!(second[0].style.fg, Some(red()));
    }

    #[test]
    fn test_sequence_split_across_feeds() {
        let mut interp = EscapeInterpreter::new();
        let first = interp.feed(b"A\x1b[3");
        let second = interp.feed(b"1mB");
        assert_eq!(plain_text(&first), "A");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].text, "B");
        assert_eq!(second[0].style.fg, Some(red()));
    }

    #[test]
    fn test_utf8_split_across_feeds() {
        let bytes = "é".as_bytes();
        let mut interp = EscapeInterpreter::new();
        let first = interp.feed(&bytes[..1]);
        let second = interp.feed(&bytes[1..]);
        assert!(first.is_empty());
        assert_eq!(plain_text(&second), "é");
    }

    #[test]
    fn test_reset_discards_state() {
        let mut interp = EscapeInterpreter::new();
        interp.feed(b"\x1b[1m\x1b[3");
        interp.reset();
        let runs = interp.feed(b"1mX");
        assert_eq!(plain_text(&runs), "1mX");
        assert!(runs[0].style.is_default());
    }

    #[test]
    fn test_osc_signals() {
        let mut interp = EscapeInterpreter::new();
        interp.feed(b"\x1b]2;my title\x07\x1b]7;file://host/home/me/My%20Dir\x07\x1b]133;A\x07$ ");
        let signals = interp.take_signals();
        assert_eq!(
            signals,
            vec![
                Signal::Title("my title".to_string()),
                Signal::WorkingDirectory("/home/me/My Dir".to_string()),
                Signal::PromptMark,
            ]
        );
        assert!(interp.take_signals().is_empty());
    }

    #[test]
    fn test_last_lines() {
        let text = "one\ntwo\nthree\n";
        assert_eq!(last_lines(text, 1), "three\n");
        assert_eq!(last_lines(text, 2), "two\nthree\n");
        assert_eq!(last_lines(text, 10), text);
        assert_eq!(last_lines("a\nb", 1), "b");
        assert_eq!(last_lines(text, 0), "");
    }

    #[test]
    fn test_parse_tail() {
        let text = "\x1b[31mold\n\x1b[32mnew\n";
        let runs = parse_tail(text, 1);
        assert_eq!(plain_text(&runs), "new\n");
        assert_eq!(runs[0].style.fg, Some(palette::standard(2)));
    }

    #[test]
    fn test_overlong_sgr_applies_parsed_params() {
        let text = format!("\x1b[31;{}1mX", "1;".repeat(40));
        let runs = parse(&text);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "X");
        assert_eq!(runs[0].style.fg, Some(red()));
        assert!(runs[0].style.bold());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::style::plain_text;
    use proptest::prelude::*;
    use proptest::sample::Index;

    /// Text, SGR and other CSI sequences, OSC strings and stray controls.
    fn fragment() -> impl Strategy<Value = String> {
        prop_oneof![
            "\\PC{1,16}",
            prop::collection::vec(0u16..120, 0..6).prop_map(|codes| {
                let codes: Vec<String> = codes.iter().map(u16::to_string).collect();
                format!("\x1b[{}m", codes.join(";"))
            }),
            (0u16..300).prop_map(|n| format!("\x1b[38:5:{n}m")),
            "[a-z0-9;/:]{0,24}".prop_map(|body| format!("\x1b]{body}\x07")),
            "[0-9;]{0,6}[a-zA-Z]".prop_map(|csi| format!("\x1b[{csi}")),
            "[\\x00-\\x1a\\x1c-\\x1f]{1,3}",
        ]
    }

    fn stream() -> impl Strategy<Value = String> {
        prop::collection::vec(fragment(), 0..24).prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn prop_printable_text_is_one_default_run(text in "\\PC{1,64}") {
            let runs = parse(&text);
            prop_assert_eq!(runs.len(), 1);
            prop_assert_eq!(&runs[0].text, &text);
            prop_assert!(runs[0].style.is_default());
        }

        #[test]
        fn prop_plain_text_matches_strip(text in stream()) {
            prop_assert_eq!(plain_text(&parse(&text)), strip_codes(&text));
        }

        #[test]
        fn prop_leading_reset_changes_nothing(text in stream()) {
            prop_assert_eq!(parse(&format!("\x1b[0m{text}")), parse(&text));
        }

        /// Feeding arbitrary byte splits (mid-sequence, mid-character) gives
        /// the same runs as one parse.
        #[test]
        fn prop_chunked_feed_matches_parse(
            text in stream(),
            cuts in prop::collection::vec(any::<Index>(), 0..8),
        ) {
            let bytes = text.as_bytes();
            let mut points: Vec<usize> = cuts.iter().map(|ix| ix.index(bytes.len() + 1)).collect();
            points.push(0);
            points.push(bytes.len());
            points.sort_unstable();
            points.dedup();

            let mut interpreter = EscapeInterpreter::new();
            let mut runs = Vec::new();
            for w in points.windows(2) {
                for run in interpreter.feed(&bytes[w[0]..w[1]]) {
                    push_run(&mut runs, run);
                }
            }
            prop_assert_eq!(runs, parse(&text));
        }
    }
}
