//! Individual sanitizer passes.
//!
//! Each pass is a function `&str -> String` applied in sequence by
//! [`crate::sanitize_html`]. Every pass is a fixpoint of itself.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Elements dropped together with their content.
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "svg", "iframe", "header", "footer", "nav", "form", "select",
    "textarea", "button",
];

/// Void form controls (no closing tag).
const DROPPED_VOID: &[&str] = &["input"];

/// Attributes that survive attribute stripping.
const KEPT_ATTRIBUTES: &[&str] = &["href", "src"];

// ---------------------------------------------------------------------------
// Pass 1: Drop whole elements
// ---------------------------------------------------------------------------

/// Remove dropped elements including their content, then any stray tag of a
/// dropped element left behind by nesting or truncation.
pub(crate) fn drop_elements(html: &str) -> String {
    static BLOCK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        DROPPED_ELEMENTS
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("valid regex")
            })
            .collect()
    });
    static STRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
        let names = DROPPED_ELEMENTS
            .iter()
            .chain(DROPPED_VOID)
            .copied()
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)<\s*/?\s*(?:{names})\b[^>]*>?")).expect("valid regex")
    });

    let mut result = html.to_string();
    for re in BLOCK_RES.iter() {
        result = re.replace_all(&result, " ").into_owned();
    }
    STRAY_RE.replace_all(&result, " ").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 2: Drop comments
// ---------------------------------------------------------------------------

/// Remove HTML comments, including an unterminated trailing one.
pub(crate) fn drop_comments(html: &str) -> String {
    static COMMENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|\z)").expect("valid regex"));

    COMMENT_RE.replace_all(html, " ").replace("-->", " ")
}

// ---------------------------------------------------------------------------
// Pass 3: Strip attributes
// ---------------------------------------------------------------------------

/// Rewrite every tag keeping only `href` and `src`, normalized to
/// lowercase tag names and double-quoted values.
pub(crate) fn strip_attributes(html: &str) -> String {
    static OPEN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)<([a-zA-Z][a-zA-Z0-9-]*)(\s[^<>]*?)?(/?)>").expect("valid regex")
    });
    static CLOSE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</\s*([a-zA-Z][a-zA-Z0-9-]*)\s*>").expect("valid regex")
    });
    static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)(?:^|\s)([a-z][a-z0-9_:-]*)\s*=\s*("[^"]*"|'[^']*'|[^\s"'>]+)"#)
            .expect("valid regex")
    });

    let opened = OPEN_TAG_RE.replace_all(html, |caps: &Captures| {
        let name = caps[1].to_ascii_lowercase();
        let mut kept = String::new();
        if let Some(attrs) = caps.get(2) {
            for attr in ATTR_RE.captures_iter(attrs.as_str()) {
                let attr_name = attr[1].to_ascii_lowercase();
                if !KEPT_ATTRIBUTES.contains(&attr_name.as_str()) {
                    continue;
                }
                let value = attr[2]
                    .trim_matches(|c| c == '"' || c == '\'')
                    .replace('"', "&quot;");
                kept.push_str(&format!(" {attr_name}=\"{value}\""));
            }
        }
        format!("<{name}{kept}{}>", &caps[3])
    });

    CLOSE_TAG_RE
        .replace_all(&opened, |caps: &Captures| format!("</{}>", caps[1].to_ascii_lowercase()))
        .into_owned()
}

// ---------------------------------------------------------------------------
// Pass 4: Collapse whitespace
// ---------------------------------------------------------------------------

/// Collapse whitespace runs to a single space and trim the ends.
pub(crate) fn collapse_whitespace(html: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    WS_RE.replace_all(html, " ").trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Remove empty elements
// ---------------------------------------------------------------------------

/// Remove attribute-less elements with no content, repeatedly, so nested
/// empties collapse too. Elements keeping `href`/`src` are left alone.
pub(crate) fn remove_empty_elements(html: &str) -> String {
    static EMPTY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<([a-z][a-z0-9-]*)>\s*</([a-z][a-z0-9-]*)>").expect("valid regex")
    });

    let mut current = html.to_string();
    loop {
        let next = EMPTY_RE
            .replace_all(&current, |caps: &Captures| {
                if caps[1] == caps[2] {
                    String::new()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Replace every tag with a space and decode the common entities.
pub(crate) fn strip_tags(html: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

    let text = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&text);
    collapse_whitespace(&decoded)
}

/// Decode the handful of entities that show up in product copy.
pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&rsquo;", "'")
        .replace("&ndash;", "-")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_elements_removes_content() {
        let input = r#"<p>keep</p><script type="x">alert(1)</script><NAV><a href="/">home</a></NAV>"#;
        let out = drop_elements(input);
        assert!(out.contains("<p>keep</p>"));
        assert!(!out.contains("alert"));
        assert!(!out.contains("home"));
    }

    #[test]
    fn drop_elements_handles_unclosed_and_nested() {
        let out = drop_elements("<svg><svg></svg></svg>a<script src=x");
        assert_eq!(out.trim(), "a");
    }

    #[test]
    fn drop_elements_removes_form_controls() {
        let out = drop_elements(r#"<p>Qty <input type="number" name="q"> <button>Add</button></p>"#);
        assert!(!out.contains("input"));
        assert!(!out.contains("Add"));
    }

    #[test]
    fn drop_comments_removes_unterminated() {
        assert_eq!(drop_comments("a<!-- x -->b<!-- open").trim(), "a b");
    }

    #[test]
    fn strip_attributes_keeps_href_and_src() {
        let input = r#"<A class="btn" HREF='/p/1' data-id=7>x</A><img alt="i" src=/i.png/>"#;
        assert_eq!(
            strip_attributes(input),
            r#"<a href="/p/1">x</a><img src="/i.png"/>"#
        );
    }

    #[test]
    fn strip_attributes_is_stable() {
        let once = strip_attributes(r#"<img src="a.png" />"#);
        assert_eq!(strip_attributes(&once), once);
    }

    #[test]
    fn remove_empty_elements_nested() {
        assert_eq!(
            remove_empty_elements("<div><p> </p><span></span></div><a href=\"/x\"></a>"),
            "<a href=\"/x\"></a>"
        );
    }

    #[test]
    fn remove_empty_elements_keeps_mismatched() {
        let input = "<b></i>";
        assert_eq!(remove_empty_elements(input), input);
    }

    #[test]
    fn strip_tags_decodes_entities() {
        assert_eq!(strip_tags("<p>Fire&nbsp;&amp; Smoke</p><br>Seal"), "Fire & Smoke Seal");
    }
}
