//! Tolerant tag scanning.
//!
//! This is deliberately not an XML parser. Elements are located by name
//! (case-insensitive, any of several aliases), attributes are optional,
//! unknown surrounding text is ignored, and CDATA sections are skipped so
//! a closing tag inside literal content does not end the element early.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;

use super::escape::decode_scalar;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][\w\-.:]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'/>]+))"#)
        .expect("attribute pattern is valid")
});

static OPENING_TAG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z_][\w\-.]*)").expect("tag name pattern is valid"));

/// Matcher for one element kind, under any of its alias names.
#[derive(Debug)]
pub struct TagPattern {
    /// Canonical name used in diagnostics.
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    open: Regex,
    close: Regex,
}

/// One located element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element<'a> {
    /// Raw attribute text of the opening tag.
    pub attrs: &'a str,
    /// Text between the opening and closing tags; empty when self-closing.
    pub inner: &'a str,
    /// Byte span of the whole element in the searched text.
    pub span: Range<usize>,
    pub self_closing: bool,
}

impl TagPattern {
    pub fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        let names = aliases
            .iter()
            .map(|alias| regex::escape(alias))
            .collect::<Vec<_>>()
            .join("|");
        let open = Regex::new(&format!(r"(?i)<(?:{names})(\s[^>]*?)?\s*(/?)>"))
            .expect("opening tag pattern is valid");
        let close =
            Regex::new(&format!(r"(?i)</(?:{names})\s*>")).expect("closing tag pattern is valid");
        Self {
            name,
            aliases,
            open,
            close,
        }
    }

    /// First element at or after byte offset `from`.
    ///
    /// An opening tag without a matching close is treated as absent.
    pub fn find_at<'a>(&self, haystack: &'a str, from: usize) -> Option<Element<'a>> {
        let mut search_from = from;
        while let Some(caps) = self.open.captures_at(haystack, search_from) {
            let whole = caps.get(0)?;
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            let self_closing = caps.get(2).is_some_and(|m| !m.as_str().is_empty());

            if self_closing {
                return Some(Element {
                    attrs,
                    inner: "",
                    span: whole.start()..whole.end(),
                    self_closing,
                });
            }

            if let Some(close) = self.find_close(haystack, whole.end()) {
                return Some(Element {
                    attrs,
                    inner: &haystack[whole.end()..close.start],
                    span: whole.start()..close.end,
                    self_closing,
                });
            }
            search_from = whole.end();
        }
        None
    }

    pub fn find<'a>(&self, haystack: &'a str) -> Option<Element<'a>> {
        self.find_at(haystack, 0)
    }

    /// All non-overlapping elements in order of appearance.
    pub fn find_all<'a>(&self, haystack: &'a str) -> Vec<Element<'a>> {
        let mut found = Vec::new();
        let mut from = 0;
        while let Some(element) = self.find_at(haystack, from) {
            from = element.span.end;
            found.push(element);
        }
        found
    }

    /// Locate the closing tag, skipping over CDATA sections.
    fn find_close(&self, haystack: &str, from: usize) -> Option<Range<usize>> {
        let mut cursor = from;
        loop {
            let tail = &haystack[cursor..];
            let close = self.close.find(tail)?;
            match tail.find(CDATA_OPEN) {
                Some(cdata) if cdata < close.start() => {
                    let body = cdata + CDATA_OPEN.len();
                    let end = tail[body..].find(CDATA_CLOSE)?;
                    cursor += body + end + CDATA_CLOSE.len();
                }
                _ => return Some(cursor + close.start()..cursor + close.end()),
            }
        }
    }
}

impl Element<'_> {
    /// Parse the opening tag's attributes. Keys are lowercased; values are
    /// entity-decoded and trimmed.
    pub fn attributes(&self) -> HashMap<String, String> {
        ATTRIBUTE
            .captures_iter(self.attrs)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str().to_ascii_lowercase();
                let value = caps.get(2).or(caps.get(3)).or(caps.get(4))?.as_str();
                Some((key, decode_scalar(value)))
            })
            .collect()
    }
}

/// Names of all opening tags in `text`, in order, without duplicates.
///
/// Text inside CDATA sections is not inspected.
pub fn tag_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = text;
    loop {
        let (scan, next) = match rest.find(CDATA_OPEN) {
            Some(start) => {
                let body = start + CDATA_OPEN.len();
                let after = rest[body..]
                    .find(CDATA_CLOSE)
                    .map_or(rest.len(), |end| body + end + CDATA_CLOSE.len());
                (&rest[..start], Some(after))
            }
            None => (rest, None),
        };
        for caps in OPENING_TAG_NAME.captures_iter(scan) {
            let name = caps[1].to_string();
            if !names.iter().any(|seen| seen.eq_ignore_ascii_case(&name)) {
                names.push(name);
            }
        }
        match next {
            Some(after) => rest = &rest[after..],
            None => return names,
        }
    }
}

/// Remove byte `span` from `text`.
pub fn without_span(text: &str, span: &Range<usize>) -> String {
    let mut out = String::with_capacity(text.len() - span.len());
    out.push_str(&text[..span.start]);
    out.push_str(&text[span.end..]);
    out
}
