//! Content decoding for directive fields.
//!
//! Model output escapes field content inconsistently: sometimes with XML
//! entities, sometimes inside `<![CDATA[...]]>`, often not at all. CDATA
//! wins when present; otherwise entity references are decoded.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(lt|gt|amp|quot|apos|#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6});")
        .expect("entity pattern is valid")
});

static CDATA_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("cdata pattern is valid"));

static COMMENT_OR_CDATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!\[CDATA\[.*?\]\]>|<!--.*?-->").expect("comment pattern is valid")
});

/// Decode the standard XML entities and numeric character references.
///
/// Unknown or invalid references are left as written.
pub fn unescape_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &Captures<'_>| {
        let name = &caps[1];
        let decoded = match name {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                let code = name.strip_prefix('#').unwrap_or(name);
                let value = match code.strip_prefix(|c: char| c.eq_ignore_ascii_case(&'x')) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => code.parse::<u32>().ok(),
                };
                value.and_then(char::from_u32)
            }
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
}

/// If `raw` consists only of CDATA sections (and whitespace between them),
/// return their concatenated contents.
pub fn cdata_contents(raw: &str) -> Option<String> {
    if !raw.contains("<![CDATA[") {
        return None;
    }
    let outside = CDATA_SECTION.replace_all(raw, "");
    if !outside.trim().is_empty() {
        return None;
    }
    Some(
        CDATA_SECTION
            .captures_iter(raw)
            .map(|caps| caps[1].to_string())
            .collect(),
    )
}

/// Drop leading and trailing whitespace-only lines; interior blank lines
/// and indentation of the first real line are preserved.
pub fn trim_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let is_blank = |line: &&str| line.trim().is_empty();
    let first = lines.iter().position(|line| !is_blank(line));
    let last = lines.iter().rposition(|line| !is_blank(line));
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Decode a content field: CDATA if present, entity unescaping otherwise,
/// then trim surrounding blank lines.
pub fn decode_content(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    let decoded = match cdata_contents(&normalized) {
        Some(literal) => literal,
        None => unescape_entities(&normalized).into_owned(),
    };
    trim_blank_lines(&decoded)
}

/// Decode a short scalar field (numbers, keywords).
pub fn decode_scalar(raw: &str) -> String {
    match cdata_contents(raw) {
        Some(literal) => literal.trim().to_string(),
        None => unescape_entities(raw).trim().to_string(),
    }
}

/// Remove `<!-- ... -->` comments outside CDATA sections.
pub fn strip_comments(text: &str) -> Cow<'_, str> {
    if !text.contains("<!--") {
        return Cow::Borrowed(text);
    }
    COMMENT_OR_CDATA.replace_all(text, |caps: &Captures<'_>| {
        let matched = &caps[0];
        if matched.starts_with("<!--") {
            String::new()
        } else {
            matched.to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_named_entities() {
        assert_eq!(
            unescape_entities("if a &lt; b &amp;&amp; c &gt; d { &quot;x&quot; &apos;y&apos; }"),
            "if a < b && c > d { \"x\" 'y' }"
        );
    }

    #[test]
    fn test_unescape_numeric_references() {
        assert_eq!(unescape_entities("a&#10;b&#13;&#9;c&#39;"), "a\nb\r\tc'");
        assert_eq!(unescape_entities("&#x41;&#X42;"), "AB");
    }

    #[test]
    fn test_unescape_is_single_pass() {
        // `&amp;lt;` is a literal `&lt;`, not `<`.
        assert_eq!(unescape_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_unescape_leaves_unknown() {
        assert_eq!(unescape_entities("&nbsp; & &#xD800;"), "&nbsp; & &#xD800;");
    }

    #[test]
    fn test_cdata_takes_precedence() {
        let raw = "\n<![CDATA[a &lt; b]]>\n";
        assert_eq!(decode_content(raw), "a &lt; b");
    }

    #[test]
    fn test_cdata_split_sections_concatenate() {
        let raw = "<![CDATA[x]]]]><![CDATA[>y]]>";
        assert_eq!(cdata_contents(raw).as_deref(), Some("x]]>y"));
    }

    #[test]
    fn test_cdata_mixed_with_text_is_not_literal() {
        assert_eq!(cdata_contents("pre <![CDATA[x]]>"), None);
    }

    #[test]
    fn test_trim_blank_lines() {
        assert_eq!(trim_blank_lines("\n\n  foo\n\n  bar\n  \n"), "  foo\n\n  bar");
        assert_eq!(trim_blank_lines("\n \n"), "");
        assert_eq!(trim_blank_lines("x"), "x");
    }

    #[test]
    fn test_decode_scalar() {
        assert_eq!(decode_scalar(" 42 \n"), "42");
        assert_eq!(decode_scalar("<![CDATA[ after ]]>"), "after");
    }

    #[test]
    fn test_strip_comments_keeps_cdata() {
        let text = "<!-- note --><a/><![CDATA[<!-- kept -->]]>";
        assert_eq!(strip_comments(text), "<a/><![CDATA[<!-- kept -->]]>");
    }
}
