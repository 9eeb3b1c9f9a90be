//! Line indexing primitives.
//!
//! Every patch operation addresses lines by their 1-based ordinal in the
//! snapshot the caller read. This module owns the conversions between raw
//! text and that line-numbered view:
//!
//! - [`add_line_numbers`] / [`strip_line_numbers`] for the bracketed
//!   `[007]` marker form shown to callers
//! - [`count_lines`] with a single, consistent definition of a line
//! - [`fragment`] for inclusive line-range extraction
//! - [`LineIndexedText`], the structured buffer the applier works on
//!
//! All functions normalise `\r\n` to `\n` before doing anything else.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt;

static LINE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\[\d+\]").expect("line marker pattern is valid"));

/// Unify line endings to `\n`.
pub fn normalize(text: &str) -> Cow<'_, str> {
    if text.contains("\r\n") {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Split already-normalised text into lines.
///
/// A single trailing `\n` terminates the last line rather than starting a
/// new empty one. Empty input has no lines.
fn split_normalized(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n').collect()
}

/// Count lines in `text`.
///
/// `""` is 0 lines, `"a"` and `"a\n"` are 1, `"a\nb"` and `"a\nb\n"` are 2.
pub fn count_lines(text: &str) -> usize {
    split_normalized(&normalize(text)).len()
}

/// Split `text` into owned lines using the same rules as [`count_lines`].
pub fn split_lines(text: &str) -> Vec<String> {
    split_normalized(&normalize(text))
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Number of decimal digits needed to print `n`.
fn digit_width(n: usize) -> usize {
    let mut width = 1;
    let mut rest = n / 10;
    while rest > 0 {
        width += 1;
        rest /= 10;
    }
    width
}

fn marker(ordinal: usize, width: usize) -> String {
    format!("[{ordinal:0width$}]")
}

/// Options for [`add_line_numbers_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numbering {
    /// Ordinal of the first line in the text (1 unless the text is a page
    /// taken from further down a file).
    pub start: usize,
    /// Fixed marker width; derived from the highest ordinal when `None`.
    pub width: Option<usize>,
}

impl Default for Numbering {
    fn default() -> Self {
        Self {
            start: 1,
            width: None,
        }
    }
}

impl Numbering {
    /// Numbering for a page whose first line is `start`.
    pub fn starting_at(start: usize) -> Self {
        Self {
            start: start.max(1),
            width: None,
        }
    }

    fn width_for(&self, total_lines: usize) -> usize {
        self.width
            .unwrap_or_else(|| digit_width(self.start + total_lines.saturating_sub(1)))
    }
}

/// Prefix every line with a zero-padded `[N]` marker, numbering from 1.
pub fn add_line_numbers(text: &str) -> String {
    add_line_numbers_with(text, Numbering::default())
}

/// Prefix every line with a zero-padded `[N]` marker.
///
/// Lines that already start with their exact expected marker are left
/// alone, so numbering twice gives the same result as numbering once.
pub fn add_line_numbers_with(text: &str, numbering: Numbering) -> String {
    let normalized = normalize(text);
    let lines = split_normalized(&normalized);
    if lines.is_empty() {
        return String::new();
    }

    let width = numbering.width_for(lines.len());
    let mut out = String::with_capacity(normalized.len() + lines.len() * (width + 2));
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let prefix = marker(numbering.start + idx, width);
        if !line.starts_with(&prefix) {
            out.push_str(&prefix);
        }
        out.push_str(line);
    }
    if normalized.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Remove the leading `[<digits>]` marker from every line.
pub fn strip_line_numbers(text: &str) -> String {
    let normalized = normalize(text);
    LINE_MARKER.replace_all(&normalized, "").into_owned()
}

/// Extract the inclusive 1-based line range `[start_line, end_line]`.
///
/// `start_line` is raised to 1 and `end_line` to `start_line`. Lines past
/// the end of the text are simply absent from the result; bounds policy
/// belongs to the validator.
pub fn fragment(text: &str, start_line: usize, end_line: usize) -> String {
    let start = start_line.max(1);
    let end = end_line.max(start);
    let normalized = normalize(text);
    split_normalized(&normalized)
        .into_iter()
        .skip(start - 1)
        .take(end - start + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Line terminator style of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
}

impl LineEnding {
    /// `Crlf` when the text contains `\r\n` and every `\n` is part of one.
    pub fn detect(text: &str) -> Self {
        let newlines = text.matches('\n').count();
        let crlf = text.matches("\r\n").count();
        if crlf > 0 && crlf == newlines {
            LineEnding::Crlf
        } else {
            LineEnding::Lf
        }
    }

    /// Re-emit `\n`-normalised text in this style.
    pub fn apply(self, normalized: &str) -> String {
        match self {
            LineEnding::Lf => normalized.to_string(),
            LineEnding::Crlf => normalized.replace('\n', "\r\n"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }
}

/// A snapshot of a file split into ordinal-addressed lines.
///
/// Renders with `[N]` markers through [`fmt::Display`]; the plain text is
/// recovered with [`LineIndexedText::to_plain`]. Markers are structural,
/// so line content that itself looks like a marker is never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndexedText {
    lines: Vec<String>,
    start: usize,
    width: usize,
    trailing_newline: bool,
    line_ending: LineEnding,
}

impl LineIndexedText {
    /// Index `text` starting at line 1.
    pub fn new(text: &str) -> Self {
        Self::with_numbering(text, Numbering::default())
    }

    pub fn with_numbering(text: &str, numbering: Numbering) -> Self {
        let line_ending = LineEnding::detect(text);
        let normalized = normalize(text);
        let lines: Vec<String> = split_normalized(&normalized)
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = numbering.width_for(lines.len());
        Self {
            trailing_newline: normalized.ends_with('\n'),
            start: numbering.start.max(1),
            width,
            lines,
            line_ending,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Ordinal of the first line.
    pub fn first_line(&self) -> usize {
        self.start
    }

    /// Ordinal of the last line, or `None` for an empty snapshot.
    pub fn last_line(&self) -> Option<usize> {
        (!self.lines.is_empty()).then(|| self.start + self.lines.len() - 1)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn trailing_newline(&self) -> bool {
        self.trailing_newline
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Text of the line with the given ordinal.
    pub fn line(&self, ordinal: usize) -> Option<&str> {
        ordinal
            .checked_sub(self.start)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
    }

    /// Iterate `(ordinal, text)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .map(move |(idx, line)| (self.start + idx, line.as_str()))
    }

    /// The `[N]` marker for `ordinal` at this snapshot's width.
    pub fn marker(&self, ordinal: usize) -> String {
        marker(ordinal, self.width)
    }

    /// Plain `\n`-separated text, keeping the original trailing newline.
    pub fn to_plain(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for LineIndexedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (ordinal, line)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}{}", self.marker(ordinal), line)?;
        }
        if self.trailing_newline && !self.lines.is_empty() {
            f.write_str("\n")?;
        }
        Ok(())
    }
}
