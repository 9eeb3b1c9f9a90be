//! Operation dialect: `<operation type="...">` elements.
//!
//! ```text
//! <operation type="replace">
//!   <range start="2" end="4"/>
//!   <content><![CDATA[new text]]></content>
//! </operation>
//! <operation type="insert" after="7"><content>...</content></operation>
//! <operation type="delete"><range start="9" end="9"/></operation>
//! ```
//!
//! Comments are stripped before parsing. `replace` expands into an
//! insertion before the range start followed by a deletion of the range,
//! both addressed against the original snapshot.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;

use super::errors::ParseError;
use super::escape::{decode_content, strip_comments};
use super::markup::{tag_names, without_span, TagPattern};
use super::parser::Segment;
use crate::edit::{EditDirective, Position};

pub(crate) static OPERATION: Lazy<TagPattern> =
    Lazy::new(|| TagPattern::new("operation", &["operation"]));

static RANGE: Lazy<TagPattern> = Lazy::new(|| TagPattern::new("range", &["range", "lines"]));
static CONTENT: Lazy<TagPattern> =
    Lazy::new(|| TagPattern::new("content", &["content", "new_content", "newContent"]));
static AFTER_LINE: Lazy<TagPattern> =
    Lazy::new(|| TagPattern::new("after_line", &["after_line", "afterLine", "line"]));
static BEFORE_LINE: Lazy<TagPattern> =
    Lazy::new(|| TagPattern::new("before_line", &["before_line", "beforeLine"]));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Replace,
    Delete,
    Insert,
}

/// Parse every `<operation>` element in `input`.
pub fn parse_operations(input: &str) -> Result<Vec<EditDirective>, ParseError> {
    let cleaned = strip_comments(input);
    let operations = OPERATION.find_all(&cleaned);
    if operations.is_empty() {
        return Err(ParseError::NoSegments);
    }
    debug!(operations = operations.len(), "located operation segments");

    let mut directives = Vec::with_capacity(operations.len());
    for (idx, element) in operations.iter().enumerate() {
        let segment = Segment::new(idx + 1, element.inner);
        let attrs = element.attributes();
        directives.extend(parse_operation(&segment, &attrs)?);
    }
    Ok(directives)
}

fn parse_operation(
    segment: &Segment<'_>,
    attrs: &HashMap<String, String>,
) -> Result<Vec<EditDirective>, ParseError> {
    let kind = match attrs.get("type") {
        Some(value) => operation_kind(segment, value)?,
        None => return Err(missing_attribute(segment, "type")),
    };

    // Position fields are looked up outside the content element.
    let content_element = CONTENT.find(segment.raw);
    let fields = match &content_element {
        Some(element) => without_span(segment.raw, &element.span),
        None => segment.raw.to_string(),
    };
    let content = || match &content_element {
        Some(element) => Ok(decode_content(element.inner)),
        None => Err(segment.missing(&CONTENT)),
    };

    match kind {
        OperationKind::Delete => {
            let (start, end) = line_range(segment, &fields, attrs)?;
            Ok(vec![EditDirective::delete(start, end)])
        }
        OperationKind::Replace => {
            let (start, end) = line_range(segment, &fields, attrs)?;
            let content = content()?;
            // Insert first so the anchor is the untouched original line.
            Ok(vec![
                EditDirective::insert(start, Position::Before, content),
                EditDirective::delete(start, end),
            ])
        }
        OperationKind::Insert => {
            let (anchor, position) = insert_anchor(segment, &fields, attrs)?;
            let content = content()?;
            Ok(vec![match position {
                Position::After => EditDirective::insert_after(anchor, content),
                Position::Before => EditDirective::insert(anchor, Position::Before, content),
            }])
        }
    }
}

fn operation_kind(segment: &Segment<'_>, value: &str) -> Result<OperationKind, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "replace" => Ok(OperationKind::Replace),
        "delete" => Ok(OperationKind::Delete),
        "insert" => Ok(OperationKind::Insert),
        _ => Err(ParseError::InvalidValue {
            segment: segment.number,
            field: "type",
            value: value.to_string(),
            expected: "`replace`, `delete` or `insert`",
            raw: segment.raw.to_string(),
        }),
    }
}

/// `start`/`end` from a nested `<range/>` element, falling back to
/// attributes on the operation itself.
fn line_range(
    segment: &Segment<'_>,
    fields: &str,
    op_attrs: &HashMap<String, String>,
) -> Result<(usize, usize), ParseError> {
    let range_attrs = match RANGE.find(fields) {
        Some(element) => element.attributes(),
        None if op_attrs.contains_key("start") => op_attrs.clone(),
        None => return Err(segment.missing(&RANGE)),
    };
    let start = match range_attrs.get("start") {
        Some(value) => segment.number_value("range.start", value)?,
        None => return Err(missing_attribute(segment, "range.start")),
    };
    let end = match range_attrs.get("end") {
        Some(value) => segment.number_value("range.end", value)?,
        None => return Err(missing_attribute(segment, "range.end")),
    };
    Ok((start, end))
}

fn insert_anchor(
    segment: &Segment<'_>,
    fields: &str,
    attrs: &HashMap<String, String>,
) -> Result<(usize, Position), ParseError> {
    if let Some(value) = attrs.get("after") {
        return Ok((segment.number_value("after", value)?, Position::After));
    }
    if let Some(value) = attrs.get("before") {
        return Ok((segment.number_value("before", value)?, Position::Before));
    }
    if let Some(element) = AFTER_LINE.find(fields) {
        return Ok((
            segment.number_value(AFTER_LINE.name, element.inner)?,
            Position::After,
        ));
    }
    if let Some(element) = BEFORE_LINE.find(fields) {
        return Ok((
            segment.number_value(BEFORE_LINE.name, element.inner)?,
            Position::Before,
        ));
    }
    Err(missing_attribute(segment, "after"))
}

fn missing_attribute(segment: &Segment<'_>, field: &'static str) -> ParseError {
    ParseError::MissingField {
        segment: segment.number,
        field,
        found: tag_names(segment.raw),
        suggestion: None,
        raw: segment.raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_expands_insert_then_delete() {
        let input = r#"<operation type="replace"><range start="2" end="2"/><content><![CDATA[Z]]></content></operation>"#;
        assert_eq!(
            parse_operations(input).unwrap(),
            vec![
                EditDirective::insert(2, Position::Before, "Z"),
                EditDirective::delete(2, 2),
            ]
        );
    }

    #[test]
    fn test_delete() {
        let input = r#"<operation type="DELETE"><range start="3" end="5" /></operation>"#;
        assert_eq!(
            parse_operations(input).unwrap(),
            vec![EditDirective::delete(3, 5)]
        );
    }

    #[test]
    fn test_insert_after_attribute() {
        let input = r#"<operation type="insert" after="7"><content>tail</content></operation>"#;
        assert_eq!(
            parse_operations(input).unwrap(),
            vec![EditDirective::insert_after(7, "tail")]
        );
    }

    #[test]
    fn test_insert_nested_line_field() {
        let input = r#"<operation type="insert"><after_line>1</after_line><content>x</content></operation>"#;
        assert_eq!(
            parse_operations(input).unwrap(),
            vec![EditDirective::insert_after(1, "x")]
        );
    }

    #[test]
    fn test_insert_before_attribute() {
        let input = r#"<operation type="insert" before="1"><content>header</content></operation>"#;
        assert_eq!(
            parse_operations(input).unwrap(),
            vec![EditDirective::insert(1, Position::Before, "header")]
        );
    }

    #[test]
    fn test_range_on_operation_attributes() {
        let input = r#"<operation type="delete" start="4" end="4"></operation>"#;
        assert_eq!(
            parse_operations(input).unwrap(),
            vec![EditDirective::delete(4, 4)]
        );
    }

    #[test]
    fn test_comments_stripped() {
        let input = r#"<!-- <operation type="delete"><range start="1" end="1"/></operation> -->
<operation type="delete"><range start="2" end="2"/><!-- why --></operation>"#;
        assert_eq!(
            parse_operations(input).unwrap(),
            vec![EditDirective::delete(2, 2)]
        );
    }

    #[test]
    fn test_comment_inside_cdata_preserved() {
        let input = r#"<operation type="insert" after="1"><content><![CDATA[<!-- keep -->]]></content></operation>"#;
        assert_eq!(parse_operations(input).unwrap()[0].content(), "<!-- keep -->");
    }

    #[test]
    fn test_unknown_type() {
        let input = r#"<operation type="move"><range start="1" end="1"/></operation>"#;
        assert!(matches!(
            parse_operations(input).unwrap_err(),
            ParseError::InvalidValue { field: "type", .. }
        ));
    }

    #[test]
    fn test_missing_type() {
        let input = r#"<operation><range start="1" end="1"/></operation>"#;
        assert!(matches!(
            parse_operations(input).unwrap_err(),
            ParseError::MissingField { field: "type", .. }
        ));
    }

    #[test]
    fn test_missing_range() {
        let input = r#"<operation type="delete"></operation>"#;
        assert!(matches!(
            parse_operations(input).unwrap_err(),
            ParseError::MissingField { field: "range", .. }
        ));
    }

    #[test]
    fn test_non_numeric_range() {
        let input = r#"<operation type="delete"><range start="one" end="2"/></operation>"#;
        assert!(matches!(
            parse_operations(input).unwrap_err(),
            ParseError::NonNumericField {
                field: "range.start",
                ..
            }
        ));
    }

    #[test]
    fn test_replace_requires_content() {
        let input = r#"<operation type="replace"><range start="1" end="1"/></operation>"#;
        assert!(matches!(
            parse_operations(input).unwrap_err(),
            ParseError::MissingField {
                field: "content",
                ..
            }
        ));
    }

    #[test]
    fn test_no_operations() {
        assert_eq!(
            parse_operations("<!-- nothing -->").unwrap_err(),
            ParseError::NoSegments
        );
    }
}
