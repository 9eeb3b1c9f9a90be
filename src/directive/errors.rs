use thiserror::Error;

/// Failures while extracting directives from model output.
///
/// Segment numbers are 1-based positions of the `<edit>` / `<operation>`
/// element in the input. Every variant except [`ParseError::NoSegments`]
/// carries the raw text of the offending segment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no edit segments found: expected one or more <edit>...</edit> or <operation>...</operation> elements")]
    NoSegments,

    #[error(
        "segment {segment}: missing required field `{field}`{}",
        missing_hint(.found, .suggestion)
    )]
    MissingField {
        segment: usize,
        field: &'static str,
        /// Tag names that were present in the segment.
        found: Vec<String>,
        /// Closest present tag name, when it looks like a typo of `field`.
        suggestion: Option<String>,
        raw: String,
    },

    #[error("segment {segment}: field `{field}` must be a non-negative integer, found {value:?}")]
    NonNumericField {
        segment: usize,
        field: &'static str,
        value: String,
        raw: String,
    },

    #[error("segment {segment}: field `{field}` has invalid value {value:?} (expected {expected})")]
    InvalidValue {
        segment: usize,
        field: &'static str,
        value: String,
        expected: &'static str,
        raw: String,
    },
}

impl ParseError {
    /// Raw text of the segment that failed, if the failure is segment-local.
    pub fn raw_segment(&self) -> Option<&str> {
        match self {
            ParseError::NoSegments => None,
            ParseError::MissingField { raw, .. }
            | ParseError::NonNumericField { raw, .. }
            | ParseError::InvalidValue { raw, .. } => Some(raw),
        }
    }

    /// 1-based segment number, if the failure is segment-local.
    pub fn segment(&self) -> Option<usize> {
        match self {
            ParseError::NoSegments => None,
            ParseError::MissingField { segment, .. }
            | ParseError::NonNumericField { segment, .. }
            | ParseError::InvalidValue { segment, .. } => Some(*segment),
        }
    }
}

fn missing_hint(found: &[String], suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (found `{name}`, which looks like a misspelling of it)"),
        None if found.is_empty() => " (segment contains no fields)".to_string(),
        None => format!(" (found fields: {})", found.join(", ")),
    }
}
