//! Batch validation.
//!
//! Every check here runs before any content is touched:
//!
//! 1. **Staleness**: the caller's declared line count must equal the
//!    current line count. A mismatch means the file changed since the
//!    caller read it.
//! 2. **Bounds**: ranges satisfy `1 <= start <= end <= line_count`;
//!    insertion anchors satisfy `1 <= anchor <= line_count`.
//! 3. **Overlap**: replacement ranges are pairwise disjoint, regardless of
//!    submission order. Touching ranges are fine. Insertions are anchor
//!    points and are never checked for overlap.
//!
//! Validation is a pure function of its inputs; serialising concurrent
//! patches to the same file is the host's job.

use std::fmt;
use thiserror::Error;

use crate::edit::EditDirective;

/// Why a directive's line reference is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsViolation {
    /// A line number of 0.
    BelowFirstLine,
    /// `start_line > end_line`.
    Inverted,
    /// A line number past the end of the file.
    PastLastLine,
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundsViolation::BelowFirstLine => f.write_str("line numbers start at 1"),
            BoundsViolation::Inverted => f.write_str("start line is after end line"),
            BoundsViolation::PastLastLine => f.write_str("line is past the end of the file"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "stale snapshot: the edit was prepared against {declared} lines but the file now has {actual} lines; re-read the file and retry"
    )]
    StaleSnapshot { declared: usize, actual: usize },

    #[error("edit {edit} ({directive}) is out of bounds: {violation}; {}", valid_lines(.line_count))]
    OutOfBounds {
        /// 1-based position of the directive in the batch.
        edit: usize,
        directive: String,
        violation: BoundsViolation,
        line_count: usize,
    },

    #[error(
        "edit {first} (lines {first_start}-{first_end}) overlaps edit {second} (lines {second_start}-{second_end})"
    )]
    OverlappingEdits {
        first: usize,
        first_start: usize,
        first_end: usize,
        second: usize,
        second_start: usize,
        second_end: usize,
    },
}

fn valid_lines(line_count: &usize) -> String {
    match *line_count {
        0 => "the file is empty".to_string(),
        1 => "the only valid line is 1".to_string(),
        n => format!("valid lines are 1-{n}"),
    }
}

/// A batch that passed every check against a snapshot of `line_count`
/// lines. Only obtainable through [`validate`].
#[derive(Debug, Clone, Copy)]
pub struct ValidatedBatch<'a> {
    directives: &'a [EditDirective],
    line_count: usize,
}

impl<'a> ValidatedBatch<'a> {
    pub fn directives(&self) -> &'a [EditDirective] {
        self.directives
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Number of original lines the batch removes.
    pub fn lines_removed(&self) -> usize {
        self.directives
            .iter()
            .filter_map(EditDirective::range)
            .map(|(start, end)| end - start + 1)
            .sum()
    }

    /// Number of lines the batch adds.
    pub fn lines_added(&self) -> usize {
        self.directives
            .iter()
            .map(|directive| directive.content_lines().len())
            .sum()
    }

    /// Line count the patched file must have.
    pub fn expected_line_count(&self) -> usize {
        self.line_count - self.lines_removed() + self.lines_added()
    }
}

/// Check `directives` against the current snapshot.
pub fn validate(
    current_line_count: usize,
    declared_line_count: usize,
    directives: &[EditDirective],
) -> Result<ValidatedBatch<'_>, ValidationError> {
    if current_line_count != declared_line_count {
        return Err(ValidationError::StaleSnapshot {
            declared: declared_line_count,
            actual: current_line_count,
        });
    }

    for (idx, directive) in directives.iter().enumerate() {
        if let Some(violation) = bounds_violation(directive, current_line_count) {
            return Err(ValidationError::OutOfBounds {
                edit: idx + 1,
                directive: directive.to_string(),
                violation,
                line_count: current_line_count,
            });
        }
    }

    check_overlaps(directives)?;

    Ok(ValidatedBatch {
        directives,
        line_count: current_line_count,
    })
}

fn bounds_violation(directive: &EditDirective, line_count: usize) -> Option<BoundsViolation> {
    let (start, end) = match (directive.range(), directive.anchor()) {
        (Some(range), _) => range,
        (None, Some((anchor, _))) => (anchor, anchor),
        (None, None) => return None,
    };
    if start == 0 {
        Some(BoundsViolation::BelowFirstLine)
    } else if start > end {
        Some(BoundsViolation::Inverted)
    } else if end > line_count {
        Some(BoundsViolation::PastLastLine)
    } else {
        None
    }
}

fn check_overlaps(directives: &[EditDirective]) -> Result<(), ValidationError> {
    let mut ranges: Vec<(usize, usize, usize)> = directives
        .iter()
        .enumerate()
        .filter_map(|(idx, directive)| directive.range().map(|(s, e)| (s, e, idx + 1)))
        .collect();
    // Stable: equal starts keep submission order.
    ranges.sort_by_key(|&(start, _, _)| start);

    for pair in ranges.windows(2) {
        let (prev_start, prev_end, prev) = pair[0];
        let (next_start, next_end, next) = pair[1];
        if next_start <= prev_end {
            let ((first, first_start, first_end), (second, second_start, second_end)) =
                if prev < next {
                    ((prev, prev_start, prev_end), (next, next_start, next_end))
                } else {
                    ((next, next_start, next_end), (prev, prev_start, prev_end))
                };
            return Err(ValidationError::OverlappingEdits {
                first,
                first_start,
                first_end,
                second,
                second_start,
                second_end,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::Position;

    #[test]
    fn test_stale_snapshot() {
        let directives = vec![EditDirective::replace(1, 1, "x")];
        let err = validate(10, 9, &directives).unwrap_err();
        assert_eq!(
            err,
            ValidationError::StaleSnapshot {
                declared: 9,
                actual: 10
            }
        );
        let message = err.to_string();
        assert!(message.contains("9 lines"));
        assert!(message.contains("10 lines"));
    }

    #[test]
    fn test_stale_checked_before_bounds() {
        let directives = vec![EditDirective::replace(0, 0, "x")];
        assert!(matches!(
            validate(4, 5, &directives),
            Err(ValidationError::StaleSnapshot { .. })
        ));
    }

    #[test]
    fn test_zero_start_out_of_bounds() {
        let directives = vec![EditDirective::replace(0, 2, "x")];
        assert!(matches!(
            validate(4, 4, &directives),
            Err(ValidationError::OutOfBounds {
                edit: 1,
                violation: BoundsViolation::BelowFirstLine,
                ..
            })
        ));
    }

    #[test]
    fn test_inverted_range_out_of_bounds() {
        let directives = vec![EditDirective::replace(5, 3, "x")];
        assert!(matches!(
            validate(10, 10, &directives),
            Err(ValidationError::OutOfBounds {
                violation: BoundsViolation::Inverted,
                ..
            })
        ));
    }

    #[test]
    fn test_end_past_file() {
        let directives = vec![
            EditDirective::replace(1, 1, "ok"),
            EditDirective::replace(3, 5, "x"),
        ];
        let err = validate(4, 4, &directives).unwrap_err();
        assert_eq!(
            err.to_string(),
            "edit 2 (replace lines 3-5) is out of bounds: line is past the end of the file; valid lines are 1-4"
        );
    }

    #[test]
    fn test_anchor_bounds() {
        let past = vec![EditDirective::insert_after(5, "x")];
        assert!(matches!(
            validate(4, 4, &past),
            Err(ValidationError::OutOfBounds {
                violation: BoundsViolation::PastLastLine,
                ..
            })
        ));

        let zero = vec![EditDirective::insert(0, Position::Before, "x")];
        assert!(matches!(
            validate(4, 4, &zero),
            Err(ValidationError::OutOfBounds {
                violation: BoundsViolation::BelowFirstLine,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_file_rejects_everything() {
        let directives = vec![EditDirective::insert_after(1, "x")];
        let err = validate(0, 0, &directives).unwrap_err();
        assert!(err.to_string().ends_with("the file is empty"));
    }

    #[test]
    fn test_overlap_detected_in_any_order() {
        let directives = vec![
            EditDirective::replace(4, 8, "b"),
            EditDirective::replace(1, 5, "a"),
        ];
        let err = validate(10, 10, &directives).unwrap_err();
        assert_eq!(
            err,
            ValidationError::OverlappingEdits {
                first: 1,
                first_start: 4,
                first_end: 8,
                second: 2,
                second_start: 1,
                second_end: 5,
            }
        );
        assert_eq!(
            err.to_string(),
            "edit 1 (lines 4-8) overlaps edit 2 (lines 1-5)"
        );
    }

    #[test]
    fn test_nested_overlap() {
        let directives = vec![
            EditDirective::replace(1, 10, "a"),
            EditDirective::replace(3, 4, "b"),
            EditDirective::replace(6, 7, "c"),
        ];
        assert!(matches!(
            validate(10, 10, &directives),
            Err(ValidationError::OverlappingEdits { .. })
        ));
    }

    #[test]
    fn test_touching_ranges_allowed() {
        let directives = vec![
            EditDirective::replace(1, 5, "a"),
            EditDirective::replace(6, 8, "b"),
        ];
        assert!(validate(10, 10, &directives).is_ok());
    }

    #[test]
    fn test_insertions_never_overlap() {
        let directives = vec![
            EditDirective::replace(2, 4, "a"),
            EditDirective::insert(3, Position::Before, "b"),
            EditDirective::insert(3, Position::After, "c"),
            EditDirective::insert_after(3, "d"),
        ];
        assert!(validate(5, 5, &directives).is_ok());
    }

    #[test]
    fn test_expected_line_count() {
        let directives = vec![
            EditDirective::replace(1, 2, "one"),
            EditDirective::insert_after(4, "x\ny"),
            EditDirective::delete(5, 5),
        ];
        let batch = validate(6, 6, &directives).unwrap();
        assert_eq!(batch.lines_removed(), 3);
        assert_eq!(batch.lines_added(), 3);
        assert_eq!(batch.expected_line_count(), 6);
    }
}
