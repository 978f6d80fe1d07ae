use bitflags::bitflags;

/// RGB color value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

bitflags! {
    /// Text attribute flags carried by the pen, packed into a single byte.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StyleFlags: u8 {
        const BOLD      = 0b0000_0001;
        const DIM       = 0b0000_0010;
        const ITALIC    = 0b0000_0100;
        const UNDERLINE = 0b0000_1000;
    }
}

/// The "current pen" while scanning a byte stream.
///
/// `None` colors mean "use the renderer's default".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StyleState {
    pub fg: Option<Rgb>,
    pub bg: Option<Rgb>,
    pub flags: StyleFlags,
}

impl StyleState {
    /// Returns `true` if no color or attribute is set.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn bold(&self) -> bool {
        self.flags.contains(StyleFlags::BOLD)
    }

    pub fn dim(&self) -> bool {
        self.flags.contains(StyleFlags::DIM)
    }

    pub fn italic(&self) -> bool {
        self.flags.contains(StyleFlags::ITALIC)
    }

    pub fn underline(&self) -> bool {
        self.flags.contains(StyleFlags::UNDERLINE)
    }
}

/// A span of text drawn with a single style.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub style: StyleState,
}

impl StyledRun {
    pub fn new(text: impl Into<String>, style: StyleState) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// Concatenate the text of a run sequence, dropping all styling.
pub fn plain_text(runs: &[StyledRun]) -> String {
    runs.iter().map(|run| run.text.as_str()).collect()
}

/// Append `run` to `runs`, merging it into the last run when the styles match.
///
/// Empty runs are discarded.
pub fn push_run(runs: &mut Vec<StyledRun>, run: StyledRun) {
    if run.text.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(last) if last.style == run.style => last.text.push_str(&run.text),
        _ => runs.push(run),
    }
}

/// SGR sequence that selects `style` from a reset pen.
fn sgr_for(style: &StyleState) -> String {
    let mut codes: Vec<String> = vec!["0".to_string()];
    if style.bold() {
        codes.push("1".to_string());
    }
    if style.dim() {
        codes.push("2".to_string());
    }
    if style.italic() {
        codes.push("3".to_string());
    }
    if style.underline() {
        codes.push("4".to_string());
    }
    if let Some(Rgb { r, g, b }) = style.fg {
        codes.push(format!("38;2;{r};{g};{b}"));
    }
    if let Some(Rgb { r, g, b }) = style.bg {
        codes.push(format!("48;2;{r};{g};{b}"));
    }
    format!("\x1b[{}m", codes.join(";"))
}

/// Re-encode runs for display on a truecolor terminal.
///
/// The output always ends with the pen reset.
pub fn render_ansi(runs: &[StyledRun]) -> String {
    let mut out = String::new();
    for run in runs {
        if run.style.is_default() {
            out.push_str("\x1b[0m");
        } else {
            out.push_str(&sgr_for(&run.style));
        }
        out.push_str(&run.text);
    }
    if !runs.is_empty() {
        out.push_str("\x1b[0m");
    }
    out
}
