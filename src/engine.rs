//! The patch pipeline: parse → validate → apply → render.
//!
//! [`PatchEngine`] is a pure function of `(current content, declared line
//! count, directive text)`. It never touches the filesystem and holds no
//! state between calls, so one engine may be shared freely across threads.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::apply::{self, ApplyError};
use crate::directive::{self, ParseError};
use crate::edit::{fingerprint, EditBatch, EditDirective, PatchResult};
use crate::lines::{LineEnding, LineIndexedText};
use crate::validate::{self, ValidationError};

/// Stage-level classification of a failed patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedDirectiveBatch,
    StaleSnapshot,
    OutOfBounds,
    OverlappingEdits,
    ApplicationFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedDirectiveBatch => "malformed_directive_batch",
            ErrorKind::StaleSnapshot => "stale_snapshot",
            ErrorKind::OutOfBounds => "out_of_bounds",
            ErrorKind::OverlappingEdits => "overlapping_edits",
            ErrorKind::ApplicationFailure => "application_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a batch was rejected. Nothing is ever partially applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("malformed directive batch: {source}")]
    MalformedDirectiveBatch {
        #[source]
        source: ParseError,
        /// The full directive text as received.
        input: String,
    },

    #[error(transparent)]
    Rejected(#[from] ValidationError),

    #[error("application failure (internal defect, not an input problem): {0}")]
    ApplicationFailure(#[from] ApplyError),
}

impl PatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::MalformedDirectiveBatch { .. } => ErrorKind::MalformedDirectiveBatch,
            PatchError::Rejected(ValidationError::StaleSnapshot { .. }) => ErrorKind::StaleSnapshot,
            PatchError::Rejected(ValidationError::OutOfBounds { .. }) => ErrorKind::OutOfBounds,
            PatchError::Rejected(ValidationError::OverlappingEdits { .. }) => {
                ErrorKind::OverlappingEdits
            }
            PatchError::ApplicationFailure(_) => ErrorKind::ApplicationFailure,
        }
    }

    /// `true` for the kinds the caller can fix by correcting its input.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, PatchError::ApplicationFailure(_))
    }

    /// Longer diagnostic text: the message plus, for parse failures, the
    /// offending segment and the full input.
    pub fn diagnostic(&self) -> String {
        match self {
            PatchError::MalformedDirectiveBatch { source, input } => {
                let mut out = self.to_string();
                if let Some(raw) = source.raw_segment() {
                    out.push_str("\n\nOffending segment:\n");
                    out.push_str(raw);
                }
                out.push_str("\n\nFull input:\n");
                out.push_str(input);
                out
            }
            other => other.to_string(),
        }
    }
}

/// Engine behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Reject a batch whose result does not have the expected line count
    /// instead of reporting it as a warning.
    pub strict_line_count: bool,
    /// Re-emit CRLF when the original content used CRLF.
    pub preserve_line_endings: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            strict_line_count: false,
            preserve_line_endings: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatchEngine {
    options: EngineOptions,
}

impl PatchEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Parse `directive_text` and apply it to `current`.
    pub fn patch(
        &self,
        current: &str,
        declared_line_count: usize,
        directive_text: &str,
    ) -> Result<PatchResult, PatchError> {
        let batch = parse(directive_text, declared_line_count)?;
        self.patch_batch(current, &batch)
    }

    /// Parse and validate without applying.
    pub fn check(
        &self,
        current: &str,
        declared_line_count: usize,
        directive_text: &str,
    ) -> Result<EditBatch, PatchError> {
        let batch = parse(directive_text, declared_line_count)?;
        let original = LineIndexedText::new(current);
        validate::validate(original.len(), batch.declared_line_count, &batch.directives)?;
        Ok(batch)
    }

    /// Apply an already-parsed batch to `current`.
    pub fn patch_batch(&self, current: &str, batch: &EditBatch) -> Result<PatchResult, PatchError> {
        self.patch_directives(current, batch.declared_line_count, &batch.directives)
    }

    pub fn patch_directives(
        &self,
        current: &str,
        declared_line_count: usize,
        directives: &[EditDirective],
    ) -> Result<PatchResult, PatchError> {
        let original = LineIndexedText::new(current);
        let validated = validate::validate(original.len(), declared_line_count, directives)?;
        debug!(
            directives = directives.len(),
            line_count = original.len(),
            "batch validated"
        );

        let applied = apply::apply(&original, &validated)?;

        let mut warnings = Vec::new();
        let expected = validated.expected_line_count();
        if applied.line_count != expected {
            let mismatch = ApplyError::LineCountMismatch {
                expected,
                actual: applied.line_count,
            };
            if self.options.strict_line_count {
                return Err(mismatch.into());
            }
            warn!(%mismatch, "line count re-verification failed");
            warnings.push(mismatch.to_string());
        }

        let final_content = match original.line_ending() {
            LineEnding::Crlf if self.options.preserve_line_endings => {
                LineEnding::Crlf.apply(&applied.text)
            }
            _ => applied.text,
        };

        Ok(PatchResult {
            final_hash: fingerprint(&final_content),
            original_hash: fingerprint(current),
            line_count: applied.line_count,
            lines_added: applied.lines_added,
            lines_removed: applied.lines_removed,
            directives_applied: directives.len(),
            warnings,
            final_content,
        })
    }
}

fn parse(directive_text: &str, declared_line_count: usize) -> Result<EditBatch, PatchError> {
    let batch = directive::parse_batch(directive_text, declared_line_count).map_err(|source| {
        PatchError::MalformedDirectiveBatch {
            source,
            input: directive_text.to_string(),
        }
    })?;
    debug!(directives = batch.len(), "parsed directive batch");
    Ok(batch)
}

/// [`PatchEngine::patch`] with default options.
pub fn patch(
    current: &str,
    declared_line_count: usize,
    directive_text: &str,
) -> Result<PatchResult, PatchError> {
    PatchEngine::default().patch(current, declared_line_count, directive_text)
}
