//! Edit dialect: `<edit>` elements, optionally wrapped in `<edits>`.
//!
//! Each segment is classified by the fields it carries:
//!
//! - `insert_after_line` + content → [`EditDirective::InsertAfter`]
//! - `line_index` + `before_after` + content → [`EditDirective::InsertAnchored`]
//! - `original_line_range` (`start:end`) + content → [`EditDirective::ReplaceRange`]
//! - `startLine` + `endLine` + content → [`EditDirective::ReplaceRange`]

use once_cell::sync::Lazy;
use tracing::debug;

use super::errors::ParseError;
use super::escape::{decode_content, decode_scalar};
use super::markup::{tag_names, without_span, TagPattern};
use crate::edit::{EditDirective, Position};

pub(crate) static EDIT: Lazy<TagPattern> = Lazy::new(|| TagPattern::new("edit", &["edit"]));

static CONTENT: Lazy<TagPattern> = Lazy::new(|| {
    TagPattern::new("new_content", &["new_content", "newContent", "content"])
});
static START_LINE: Lazy<TagPattern> =
    Lazy::new(|| TagPattern::new("startLine", &["startLine", "start_line"]));
static END_LINE: Lazy<TagPattern> =
    Lazy::new(|| TagPattern::new("endLine", &["endLine", "end_line"]));
static LINE_RANGE: Lazy<TagPattern> = Lazy::new(|| {
    TagPattern::new("original_line_range", &["original_line_range", "line_range"])
});
static LINE_INDEX: Lazy<TagPattern> =
    Lazy::new(|| TagPattern::new("line_index", &["line_index", "lineIndex"]));
static BEFORE_AFTER: Lazy<TagPattern> =
    Lazy::new(|| TagPattern::new("before_after", &["before_after", "beforeAfter"]));
static INSERT_AFTER_LINE: Lazy<TagPattern> = Lazy::new(|| {
    TagPattern::new("insert_after_line", &["insert_after_line", "insertAfterLine"])
});

/// Below this normalized similarity a present tag is not offered as a
/// likely misspelling of a missing one.
const SUGGESTION_THRESHOLD: f64 = 0.7;

/// Parse every `<edit>` segment in `input`.
pub fn parse_edits(input: &str) -> Result<Vec<EditDirective>, ParseError> {
    let segments = EDIT.find_all(input);
    if segments.is_empty() {
        return Err(ParseError::NoSegments);
    }
    debug!(segments = segments.len(), "located edit segments");

    segments
        .iter()
        .enumerate()
        .map(|(idx, element)| Segment::new(idx + 1, element.inner).parse_edit())
        .collect()
}

/// One segment's text plus the context needed for diagnostics.
pub(crate) struct Segment<'a> {
    pub(crate) number: usize,
    pub(crate) raw: &'a str,
}

impl<'a> Segment<'a> {
    pub(crate) fn new(number: usize, raw: &'a str) -> Self {
        Self { number, raw }
    }

    fn parse_edit(&self) -> Result<EditDirective, ParseError> {
        // Look up the structural fields outside the content so text inside
        // the new content can never be mistaken for them.
        let content = CONTENT.find(self.raw);
        let fields = match &content {
            Some(element) => without_span(self.raw, &element.span),
            None => self.raw.to_string(),
        };
        let content = content.map(|element| decode_content(element.inner));

        if let Some(after) = INSERT_AFTER_LINE.find(&fields) {
            let after_line = self.number_value(INSERT_AFTER_LINE.name, after.inner)?;
            let new_content = self.require_content(content)?;
            return Ok(EditDirective::InsertAfter {
                after_line,
                new_content,
            });
        }

        if let Some(index) = LINE_INDEX.find(&fields) {
            let anchor_line = self.number_value(LINE_INDEX.name, index.inner)?;
            let placement = self.require(&BEFORE_AFTER, &fields)?;
            let position = self.position_value(BEFORE_AFTER.name, &placement)?;
            let new_content = self.require_content(content)?;
            return Ok(EditDirective::InsertAnchored {
                anchor_line,
                position,
                new_content,
            });
        }

        let (start_line, end_line) = match LINE_RANGE.find(&fields) {
            Some(range) => self.range_value(LINE_RANGE.name, range.inner)?,
            None => {
                let start = self.require(&START_LINE, &fields)?;
                let end = self.require(&END_LINE, &fields)?;
                (
                    self.number_value(START_LINE.name, &start)?,
                    self.number_value(END_LINE.name, &end)?,
                )
            }
        };
        let new_content = self.require_content(content)?;
        Ok(EditDirective::ReplaceRange {
            start_line,
            end_line,
            new_content,
        })
    }

    /// Inner text of a required field.
    pub(crate) fn require(&self, pattern: &TagPattern, haystack: &str) -> Result<String, ParseError> {
        match pattern.find(haystack) {
            Some(element) => Ok(element.inner.to_string()),
            None => Err(self.missing(pattern)),
        }
    }

    pub(crate) fn require_content(&self, content: Option<String>) -> Result<String, ParseError> {
        content.ok_or_else(|| self.missing(&CONTENT))
    }

    pub(crate) fn missing(&self, pattern: &TagPattern) -> ParseError {
        let found = tag_names(self.raw);
        let suggestion = suggest(pattern, &found);
        ParseError::MissingField {
            segment: self.number,
            field: pattern.name,
            found,
            suggestion,
            raw: self.raw.to_string(),
        }
    }

    pub(crate) fn number_value(&self, field: &'static str, raw: &str) -> Result<usize, ParseError> {
        let value = decode_scalar(raw);
        parse_line_number(&value).ok_or_else(|| ParseError::NonNumericField {
            segment: self.number,
            field,
            value,
            raw: self.raw.to_string(),
        })
    }

    pub(crate) fn position_value(
        &self,
        field: &'static str,
        raw: &str,
    ) -> Result<Position, ParseError> {
        let value = decode_scalar(raw);
        value.parse().map_err(|_| ParseError::InvalidValue {
            segment: self.number,
            field,
            value,
            expected: "`before` or `after`",
            raw: self.raw.to_string(),
        })
    }

    /// `start:end` pair.
    fn range_value(&self, field: &'static str, raw: &str) -> Result<(usize, usize), ParseError> {
        let value = decode_scalar(raw);
        let Some((start, end)) = value.split_once(':') else {
            return Err(ParseError::InvalidValue {
                segment: self.number,
                field,
                value,
                expected: "`start:end`",
                raw: self.raw.to_string(),
            });
        };
        Ok((self.number_value(field, start)?, self.number_value(field, end)?))
    }
}

/// Digits only, surrounding whitespace allowed.
pub(crate) fn parse_line_number(value: &str) -> Option<usize> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

/// Closest present tag to a missing field, if it is a near miss.
fn suggest(pattern: &TagPattern, found: &[String]) -> Option<String> {
    found
        .iter()
        .filter(|name| {
            !pattern
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
        })
        .filter_map(|name| {
            let lowered = name.to_ascii_lowercase();
            let score = pattern
                .aliases
                .iter()
                .map(|alias| strsim::normalized_levenshtein(&alias.to_ascii_lowercase(), &lowered))
                .fold(0.0_f64, f64::max);
            (score >= SUGGESTION_THRESHOLD).then_some((name, score))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separate_numeric_fields() {
        let input = r#"
<edits>
  <edit>
    <startLine>2</startLine>
    <endLine>3</endLine>
    <newContent>
fn main() {}
    </newContent>
  </edit>
</edits>"#;
        let directives = parse_edits(input).unwrap();
        assert_eq!(directives, vec![EditDirective::replace(2, 3, "fn main() {}")]);
    }

    #[test]
    fn test_combined_range_field() {
        let input = "<edit><original_line_range> 4:6 </original_line_range><new_content>x</new_content></edit>";
        assert_eq!(
            parse_edits(input).unwrap(),
            vec![EditDirective::replace(4, 6, "x")]
        );
    }

    #[test]
    fn test_anchored_insert() {
        let input = "<edit><line_index>2</line_index><before_after>Before</before_after><new_content>X</new_content></edit>";
        assert_eq!(
            parse_edits(input).unwrap(),
            vec![EditDirective::insert(2, Position::Before, "X")]
        );
    }

    #[test]
    fn test_insert_after_line() {
        let input = "<edit><insert_after_line>7</insert_after_line><content>tail</content></edit>";
        assert_eq!(
            parse_edits(input).unwrap(),
            vec![EditDirective::insert_after(7, "tail")]
        );
    }

    #[test]
    fn test_order_of_appearance() {
        let input = "first <edit><startLine>5</startLine><endLine>5</endLine><new_content>b</new_content></edit>\
                     then <edit><startLine>1</startLine><endLine>1</endLine><new_content>a</new_content></edit>";
        let directives = parse_edits(input).unwrap();
        assert_eq!(directives[0].range(), Some((5, 5)));
        assert_eq!(directives[1].range(), Some((1, 1)));
    }

    #[test]
    fn test_escaped_content() {
        let input = "<edit><startLine>1</startLine><endLine>1</endLine><new_content>if a &lt; b &amp;&amp; c {&#10;}</new_content></edit>";
        assert_eq!(
            parse_edits(input).unwrap()[0].content(),
            "if a < b && c {\n}"
        );
    }

    #[test]
    fn test_cdata_content_with_markup() {
        let input = "<edit><startLine>1</startLine><endLine>1</endLine><new_content><![CDATA[<startLine>9</startLine> &amp;]]></new_content></edit>";
        let directives = parse_edits(input).unwrap();
        assert_eq!(directives[0].range(), Some((1, 1)));
        assert_eq!(directives[0].content(), "<startLine>9</startLine> &amp;");
    }

    #[test]
    fn test_content_fields_not_read_from_content() {
        // The only start/end fields are inside the content.
        let input = "<edit><new_content><startLine>1</startLine><endLine>1</endLine></new_content></edit>";
        let err = parse_edits(input).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "startLine", .. }));
    }

    #[test]
    fn test_empty_content_is_delete() {
        let input = "<edit><startLine>3</startLine><endLine>3</endLine><new_content></new_content></edit>";
        assert_eq!(parse_edits(input).unwrap(), vec![EditDirective::delete(3, 3)]);
    }

    #[test]
    fn test_blank_line_trimming_keeps_interior() {
        let input = "<edit><startLine>1</startLine><endLine>1</endLine><new_content>\n\n  a\n\n  b\n\n</new_content></edit>";
        assert_eq!(parse_edits(input).unwrap()[0].content(), "  a\n\n  b");
    }

    #[test]
    fn test_no_segments() {
        assert_eq!(
            parse_edits("I changed line 3 to say hello.").unwrap_err(),
            ParseError::NoSegments
        );
    }

    #[test]
    fn test_missing_content() {
        let input = "<edit><startLine>1</startLine><endLine>2</endLine></edit>";
        let err = parse_edits(input).unwrap_err();
        match err {
            ParseError::MissingField {
                segment,
                field,
                found,
                raw,
                ..
            } => {
                assert_eq!(segment, 1);
                assert_eq!(field, "new_content");
                assert_eq!(found, vec!["startLine", "endLine"]);
                assert_eq!(raw, "<startLine>1</startLine><endLine>2</endLine>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_names_second_segment() {
        let input = "<edit><startLine>1</startLine><endLine>1</endLine><new_content>a</new_content></edit>\
                     <edit><startLine>2</startLine><new_content>b</new_content></edit>";
        let err = parse_edits(input).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingField {
                segment: 2,
                field: "endLine",
                ..
            }
        ));
    }

    #[test]
    fn test_misspelled_field_suggestion() {
        let input = "<edit><strat_line>1</strat_line><endLine>1</endLine><new_content>a</new_content></edit>";
        match parse_edits(input).unwrap_err() {
            ParseError::MissingField { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("strat_line"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_field() {
        let input = "<edit><startLine>two</startLine><endLine>3</endLine><new_content>a</new_content></edit>";
        let err = parse_edits(input).unwrap_err();
        assert!(matches!(
            err,
            ParseError::NonNumericField {
                field: "startLine",
                ref value,
                ..
            } if value == "two"
        ));
    }

    #[test]
    fn test_negative_is_non_numeric() {
        let input = "<edit><startLine>-1</startLine><endLine>3</endLine><new_content>a</new_content></edit>";
        assert!(matches!(
            parse_edits(input).unwrap_err(),
            ParseError::NonNumericField { .. }
        ));
    }

    #[test]
    fn test_malformed_combined_range() {
        let input = "<edit><original_line_range>4-6</original_line_range><new_content>x</new_content></edit>";
        assert!(matches!(
            parse_edits(input).unwrap_err(),
            ParseError::InvalidValue {
                field: "original_line_range",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_before_after() {
        let input = "<edit><line_index>2</line_index><before_after>above</before_after><new_content>X</new_content></edit>";
        assert!(matches!(
            parse_edits(input).unwrap_err(),
            ParseError::InvalidValue {
                field: "before_after",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_line_number() {
        assert_eq!(parse_line_number(" 12 "), Some(12));
        assert_eq!(parse_line_number("+1"), None);
        assert_eq!(parse_line_number("1.5"), None);
        assert_eq!(parse_line_number(""), None);
        assert_eq!(parse_line_number("99999999999999999999999"), None);
    }
}
