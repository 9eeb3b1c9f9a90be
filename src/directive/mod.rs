//! Extraction of edit directives from loosely structured model output.
//!
//! Two dialects are accepted and auto-detected:
//!
//! - the edit dialect ([`parser`]): `<edit>` segments carrying line fields
//! - the operation dialect ([`operation`]): `<operation type="...">` segments
//!
//! Both are matched tolerantly (case-insensitive tag names, optional
//! attributes, surrounding prose ignored) and fail with diagnostics naming
//! the segment and the field at fault.

pub mod errors;
pub mod escape;
pub mod markup;
pub mod operation;
pub mod parser;

pub use errors::ParseError;
pub use operation::parse_operations;
pub use parser::parse_edits;

use crate::edit::{EditBatch, EditDirective};

/// Which wire format a directive text uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Edit,
    Operation,
}

impl Dialect {
    /// The operation dialect when an `<operation>` element is present,
    /// otherwise the edit dialect.
    pub fn detect(input: &str) -> Self {
        let cleaned = escape::strip_comments(input);
        if operation::OPERATION.find(&cleaned).is_some() {
            Dialect::Operation
        } else {
            Dialect::Edit
        }
    }
}

/// Parse `input` in whichever dialect it uses.
///
/// Directives are returned in order of appearance. Input without any
/// recognisable segment is an error, never an empty batch.
pub fn parse_directives(input: &str) -> Result<Vec<EditDirective>, ParseError> {
    match Dialect::detect(input) {
        Dialect::Edit => parse_edits(input),
        Dialect::Operation => parse_operations(input),
    }
}

/// Parse `input` into a batch declared against `declared_line_count` lines.
pub fn parse_batch(input: &str, declared_line_count: usize) -> Result<EditBatch, ParseError> {
    Ok(EditBatch::new(
        declared_line_count,
        parse_directives(input)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::Position;

    #[test]
    fn test_detect_dialect() {
        assert_eq!(
            Dialect::detect("<edits><edit></edit></edits>"),
            Dialect::Edit
        );
        assert_eq!(
            Dialect::detect(r#"<operation type="delete"><range start="1" end="1"/></operation>"#),
            Dialect::Operation
        );
        assert_eq!(
            Dialect::detect("<!-- <operation type=\"delete\"></operation> --><edit></edit>"),
            Dialect::Edit
        );
        assert_eq!(Dialect::detect("plain prose"), Dialect::Edit);
    }

    #[test]
    fn test_parse_directives_both_dialects() {
        let edit = "<edit><line_index>2</line_index><before_after>after</before_after><new_content>X</new_content></edit>";
        assert_eq!(
            parse_directives(edit).unwrap(),
            vec![EditDirective::insert(2, Position::After, "X")]
        );

        let op = r#"<operation type="insert" after="2"><content>X</content></operation>"#;
        assert_eq!(
            parse_directives(op).unwrap(),
            vec![EditDirective::insert_after(2, "X")]
        );
    }

    #[test]
    fn test_parse_batch_carries_declared_count() {
        let batch = parse_batch(
            "<edit><startLine>1</startLine><endLine>1</endLine><new_content>a</new_content></edit>",
            10,
        )
        .unwrap();
        assert_eq!(batch.declared_line_count, 10);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_nothing_found() {
        assert_eq!(parse_directives("").unwrap_err(), ParseError::NoSegments);
    }
}
