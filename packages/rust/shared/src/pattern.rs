//! Compiled extraction patterns.
//!
//! Patterns arrive as strings in job configuration and are compiled once when
//! the job is loaded. A pattern's *value* for a match is, in order of
//! preference: the named group `value`, the first capture group, or the whole
//! match. Values are trimmed; empty values are discarded.

use std::fmt;

use regex::{Captures, Regex, RegexBuilder};
use serde::{Serialize, Serializer};

use crate::error::{ProdScoutError, Result};

/// A compiled, case-insensitive, dot-matches-newline regex.
#[derive(Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern, reporting a config error naming the field on failure.
    pub fn compile(field: &str, source: &str) -> Result<Self> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .size_limit(1 << 22)
            .build()
            .map_err(|e| ProdScoutError::config(format!("invalid `{field}` pattern: {e}")))?;
        Ok(Self { regex })
    }

    /// Compile an optional pattern.
    pub fn compile_opt(field: &str, source: Option<&str>) -> Result<Option<Self>> {
        source.map(|s| Self::compile(field, s)).transpose()
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Value of the first match, if any.
    pub fn first(&self, haystack: &str) -> Option<String> {
        self.regex
            .captures_iter(haystack)
            .find_map(|caps| capture_value(&caps))
    }

    /// Values of every match, in document order.
    pub fn all(&self, haystack: &str) -> Vec<String> {
        self.regex
            .captures_iter(haystack)
            .filter_map(|caps| capture_value(&caps))
            .collect()
    }

    /// First two capture groups of every match, as key/value pairs.
    pub fn pairs(&self, haystack: &str) -> Vec<(String, String)> {
        self.regex
            .captures_iter(haystack)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str().trim();
                let value = caps.get(2)?.as_str().trim();
                (!key.is_empty() && !value.is_empty()).then(|| (key.to_string(), value.to_string()))
            })
            .collect()
    }
}

fn capture_value(caps: &Captures<'_>) -> Option<String> {
    let m = caps.name("value").or_else(|| caps.get(1)).or_else(|| caps.get(0))?;
    let value = m.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.regex.as_str()).finish()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.regex.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pattern_is_config_error() {
        let err = Pattern::compile("name_pattern", "<h1>(").unwrap_err();
        assert!(err.to_string().contains("name_pattern"));
    }

    #[test]
    fn value_prefers_named_group_then_first_group() {
        let named = Pattern::compile("p", r#"<a (?:class="x" )?href="(?P<value>[^"]+)""#).unwrap();
        assert_eq!(named.first(r#"<a href="/p/1">"#).as_deref(), Some("/p/1"));

        let grouped = Pattern::compile("p", r"<h1>(.*?)</h1>").unwrap();
        assert_eq!(grouped.first("<H1> Widget </H1>").as_deref(), Some("Widget"));

        let whole = Pattern::compile("p", r"SKU-\d+").unwrap();
        assert_eq!(whole.all("SKU-1 and SKU-22"), vec!["SKU-1", "SKU-22"]);
    }

    #[test]
    fn empty_values_are_skipped() {
        let p = Pattern::compile("p", r"<b>(.*?)</b>").unwrap();
        assert_eq!(p.all("<b> </b><b>x</b>"), vec!["x"]);
    }

    #[test]
    fn pairs_use_two_groups() {
        let p = Pattern::compile("p", r"<tr><th>(.*?)</th><td>(.*?)</td></tr>").unwrap();
        let html = "<tr><th>Width</th><td>10mm</td></tr><tr><th></th><td>x</td></tr>";
        assert_eq!(p.pairs(html), vec![("Width".to_string(), "10mm".to_string())]);
    }
}
