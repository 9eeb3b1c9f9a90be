//! Patch application over a line-indexed working buffer.
//!
//! The working buffer starts as one slot per original line, keyed by that
//! line's ordinal. Directives are applied one at a time in submission
//! order, and each one looks its anchor up by ordinal in the buffer as it
//! stands at that moment, so earlier edits never shift the lines a later
//! edit refers to:
//!
//! - a replacement tombstones the original slots of its range and places
//!   the new lines where the first of them was
//! - an insertion splices its lines next to the anchor slot; insertions on
//!   the same anchor and side keep submission order
//!
//! Rendering drops tombstones and markers to produce plain text.

use std::fmt;
use thiserror::Error;
use tracing::trace;

use crate::edit::{EditDirective, Position};
use crate::lines::LineIndexedText;
use crate::validate::ValidatedBatch;

/// Internal invariant violations. None of these are reachable for a batch
/// that passed validation against the same snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("edit {edit}: line {line} is missing from the working buffer")]
    MissingLine { edit: usize, line: usize },

    #[error("edit {edit}: line {line} was already replaced by an earlier edit")]
    AlreadyReplaced { edit: usize, line: usize },

    #[error("batch validated against {validated} lines but applied to {actual}")]
    SnapshotMismatch { validated: usize, actual: usize },

    #[error("patched content has {actual} lines, expected {expected}")]
    LineCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    Original { ordinal: usize, removed: bool },
    Replacement,
    Inserted { anchor: usize, position: Position },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    origin: Origin,
    text: String,
}

/// The buffer directives are applied to.
#[derive(Debug, Clone)]
pub struct WorkingBuffer {
    slots: Vec<Slot>,
    width: usize,
    trailing_newline: bool,
}

impl WorkingBuffer {
    pub fn new(original: &LineIndexedText) -> Self {
        let slots = original
            .iter()
            .map(|(ordinal, text)| Slot {
                origin: Origin::Original {
                    ordinal,
                    removed: false,
                },
                text: text.to_string(),
            })
            .collect();
        Self {
            slots,
            width: original.width(),
            trailing_newline: original.trailing_newline(),
        }
    }

    fn position_of(&self, line: usize) -> Option<usize> {
        self.slots.iter().position(|slot| {
            matches!(slot.origin, Origin::Original { ordinal, .. } if ordinal == line)
        })
    }

    /// Apply one directive. `edit` is its 1-based batch position.
    pub fn apply(&mut self, edit: usize, directive: &EditDirective) -> Result<(), ApplyError> {
        let lines = directive.content_lines();
        match (directive.range(), directive.anchor()) {
            (Some((start, end)), _) => self.replace(edit, start, end, lines),
            (None, Some((anchor, position))) => self.insert(edit, anchor, position, lines),
            (None, None) => Ok(()),
        }
    }

    fn replace(
        &mut self,
        edit: usize,
        start: usize,
        end: usize,
        lines: Vec<String>,
    ) -> Result<(), ApplyError> {
        let first = self
            .position_of(start)
            .ok_or(ApplyError::MissingLine { edit, line: start })?;

        // Original slots stay in ordinal order, so the range is one forward scan.
        let mut line = start;
        for slot in &mut self.slots[first..] {
            if line > end {
                break;
            }
            if let Origin::Original { ordinal, removed } = &mut slot.origin {
                if *ordinal != line {
                    return Err(ApplyError::MissingLine { edit, line });
                }
                if *removed {
                    return Err(ApplyError::AlreadyReplaced { edit, line });
                }
                *removed = true;
                line += 1;
            }
        }
        if line <= end {
            return Err(ApplyError::MissingLine { edit, line });
        }

        let replacement = lines.into_iter().map(|text| Slot {
            origin: Origin::Replacement,
            text,
        });
        self.slots.splice(first..first, replacement);
        Ok(())
    }

    fn insert(
        &mut self,
        edit: usize,
        anchor: usize,
        position: Position,
        lines: Vec<String>,
    ) -> Result<(), ApplyError> {
        let idx = self
            .position_of(anchor)
            .ok_or(ApplyError::MissingLine { edit, line: anchor })?;

        let at = match position {
            Position::Before => idx,
            Position::After => {
                // Skip earlier insertions after the same anchor.
                let mut at = idx + 1;
                while self.slots.get(at).is_some_and(|slot| {
                    slot.origin
                        == Origin::Inserted {
                            anchor,
                            position: Position::After,
                        }
                }) {
                    at += 1;
                }
                at
            }
        };

        let inserted = lines.into_iter().map(|text| Slot {
            origin: Origin::Inserted { anchor, position },
            text,
        });
        self.slots.splice(at..at, inserted);
        Ok(())
    }

    fn live(&self) -> impl Iterator<Item = &Slot> {
        self.slots
            .iter()
            .filter(|slot| !matches!(slot.origin, Origin::Original { removed: true, .. }))
    }

    pub fn line_count(&self) -> usize {
        self.live().count()
    }

    /// Plain text without markers.
    ///
    /// A trailing line break is kept when the original had one, and is
    /// forced when the last line is empty so that it still counts as a line.
    pub fn render(&self) -> String {
        let live: Vec<&str> = self.live().map(|slot| slot.text.as_str()).collect();
        let mut out = live.join("\n");
        match live.last() {
            Some(last) if self.trailing_newline || last.is_empty() => out.push('\n'),
            _ => {}
        }
        out
    }
}

/// Marker view of the buffer: original lines keep their `[N]` marker,
/// new lines are shown with `[+]`, removed lines are omitted.
impl fmt::Display for WorkingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.width;
        for (idx, slot) in self.live().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            match slot.origin {
                Origin::Original { ordinal, .. } => write!(f, "[{ordinal:0width$}]")?,
                _ => write!(f, "[{:>width$}]", "+")?,
            }
            f.write_str(&slot.text)?;
        }
        Ok(())
    }
}

/// Result of applying a validated batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Plain `\n`-separated text.
    pub text: String,
    pub line_count: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
}

/// Apply `batch` to the snapshot it was validated against.
pub fn apply(original: &LineIndexedText, batch: &ValidatedBatch<'_>) -> Result<Applied, ApplyError> {
    if original.len() != batch.line_count() {
        return Err(ApplyError::SnapshotMismatch {
            validated: batch.line_count(),
            actual: original.len(),
        });
    }

    let mut buffer = WorkingBuffer::new(original);
    for (idx, directive) in batch.directives().iter().enumerate() {
        buffer.apply(idx + 1, directive)?;
        trace!(edit = idx + 1, %directive, "applied directive");
    }
    trace!(buffer = %buffer, "working buffer after batch");

    Ok(Applied {
        text: buffer.render(),
        line_count: buffer.line_count(),
        lines_added: batch.lines_added(),
        lines_removed: batch.lines_removed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;

    fn run(text: &str, directives: &[EditDirective]) -> Result<String, ApplyError> {
        let original = LineIndexedText::new(text);
        let batch = validate(original.len(), original.len(), directives).unwrap();
        apply(&original, &batch).map(|applied| applied.text)
    }

    const FILE: &str = "a\nb\nc\nd\n";

    #[test]
    fn test_replace_single_line() {
        let out = run(FILE, &[EditDirective::replace(2, 2, "B")]).unwrap();
        assert_eq!(out, "a\nB\nc\nd\n");
    }

    #[test]
    fn test_insert_after() {
        let out = run(FILE, &[EditDirective::insert(2, Position::After, "X")]).unwrap();
        assert_eq!(out, "a\nb\nX\nc\nd\n");
    }

    #[test]
    fn test_insert_before() {
        let out = run(FILE, &[EditDirective::insert(1, Position::Before, "X")]).unwrap();
        assert_eq!(out, "X\na\nb\nc\nd\n");
    }

    #[test]
    fn test_delete_via_empty_content() {
        let out = run(FILE, &[EditDirective::delete(3, 3)]).unwrap();
        assert_eq!(out, "a\nb\nd\n");
    }

    #[test]
    fn test_delete_everything() {
        let out = run(FILE, &[EditDirective::delete(1, 4)]).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_replace_grows_and_shrinks() {
        let out = run(
            FILE,
            &[
                EditDirective::replace(1, 2, "one"),
                EditDirective::replace(4, 4, "x\ny\nz"),
            ],
        )
        .unwrap();
        assert_eq!(out, "one\nc\nx\ny\nz\n");
    }

    #[test]
    fn test_line_numbers_refer_to_original() {
        // The insertion after line 1 must not shift the replacement of line 3.
        let out = run(
            FILE,
            &[
                EditDirective::insert_after(1, "new1\nnew2"),
                EditDirective::replace(3, 3, "C"),
            ],
        )
        .unwrap();
        assert_eq!(out, "a\nnew1\nnew2\nb\nC\nd\n");
    }

    #[test]
    fn test_submission_order_does_not_matter_for_ranges() {
        let forward = run(
            FILE,
            &[
                EditDirective::replace(1, 1, "A"),
                EditDirective::replace(3, 4, "CD"),
            ],
        )
        .unwrap();
        let backward = run(
            FILE,
            &[
                EditDirective::replace(3, 4, "CD"),
                EditDirective::replace(1, 1, "A"),
            ],
        )
        .unwrap();
        assert_eq!(forward, "A\nb\nCD\n");
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_same_anchor_insertions_keep_submission_order() {
        let out = run(
            FILE,
            &[
                EditDirective::insert_after(2, "X"),
                EditDirective::insert(2, Position::After, "Y"),
                EditDirective::insert(2, Position::Before, "P"),
                EditDirective::insert(2, Position::Before, "Q"),
            ],
        )
        .unwrap();
        assert_eq!(out, "a\nP\nQ\nb\nX\nY\nc\nd\n");
    }

    #[test]
    fn test_insert_then_delete_is_replace() {
        let out = run(
            FILE,
            &[
                EditDirective::insert(2, Position::Before, "Z"),
                EditDirective::delete(2, 2),
            ],
        )
        .unwrap();
        assert_eq!(out, "a\nZ\nc\nd\n");
    }

    #[test]
    fn test_insert_anchored_on_replaced_line() {
        let out = run(
            FILE,
            &[
                EditDirective::replace(2, 3, "BC"),
                EditDirective::insert_after(3, "after-c"),
            ],
        )
        .unwrap();
        assert_eq!(out, "a\nBC\nafter-c\nd\n");
    }

    #[test]
    fn test_no_trailing_newline_preserved() {
        let out = run("a\nb", &[EditDirective::insert_after(2, "c")]).unwrap();
        assert_eq!(out, "a\nb\nc");
    }

    #[test]
    fn test_trailing_empty_line_still_counts() {
        let out = run("a\nb", &[EditDirective::replace(2, 2, "\n")]).unwrap();
        assert_eq!(out, "a\n\n");
        assert_eq!(crate::lines::count_lines(&out), 2);
    }

    #[test]
    fn test_marker_like_content_survives() {
        let out = run(FILE, &[EditDirective::replace(1, 1, "[1]: https://example.com")]).unwrap();
        assert_eq!(out, "[1]: https://example.com\nb\nc\nd\n");
    }

    #[test]
    fn test_double_replace_is_internal_error() {
        // Bypasses validation to exercise the buffer invariant directly.
        let original = LineIndexedText::new(FILE);
        let mut buffer = WorkingBuffer::new(&original);
        buffer.apply(1, &EditDirective::replace(1, 2, "x")).unwrap();
        assert_eq!(
            buffer.apply(2, &EditDirective::replace(2, 3, "y")),
            Err(ApplyError::AlreadyReplaced { edit: 2, line: 2 })
        );
    }

    #[test]
    fn test_missing_line_is_internal_error() {
        let original = LineIndexedText::new(FILE);
        let mut buffer = WorkingBuffer::new(&original);
        assert_eq!(
            buffer.apply(1, &EditDirective::insert_after(9, "x")),
            Err(ApplyError::MissingLine { edit: 1, line: 9 })
        );
    }

    #[test]
    fn test_snapshot_mismatch() {
        let directives = [EditDirective::replace(1, 1, "x")];
        let batch = validate(4, 4, &directives).unwrap();
        let other = LineIndexedText::new("only\n");
        assert_eq!(
            apply(&other, &batch),
            Err(ApplyError::SnapshotMismatch {
                validated: 4,
                actual: 1
            })
        );
    }

    #[test]
    fn test_display_shows_markers() {
        let original = LineIndexedText::new(FILE);
        let mut buffer = WorkingBuffer::new(&original);
        buffer.apply(1, &EditDirective::replace(2, 2, "B")).unwrap();
        assert_eq!(buffer.to_string(), "[1]a\n[+]B\n[3]c\n[4]d");
    }

    #[test]
    fn test_applied_counts() {
        let original = LineIndexedText::new(FILE);
        let directives = [
            EditDirective::replace(1, 2, "x"),
            EditDirective::insert_after(4, "y\nz"),
        ];
        let batch = validate(4, 4, &directives).unwrap();
        let applied = apply(&original, &batch).unwrap();
        assert_eq!(applied.lines_removed, 2);
        assert_eq!(applied.lines_added, 3);
        assert_eq!(applied.line_count, 5);
        assert_eq!(applied.text, "x\nc\nd\ny\nz\n");
    }
}
