//! HTML reduction for content-understanding input.
//!
//! [`sanitize_html`] shrinks a raw page to the structural HTML an extraction
//! prompt actually needs: no scripts, styles, chrome or form controls, no
//! comments, and only `href`/`src` attributes. Output is bounded by a
//! character budget and the function is idempotent.

mod passes;

use tracing::trace;

/// Default character budget for sanitized output.
pub const DEFAULT_MAX_CHARS: usize = 15_000;

/// Appended when output is cut to the budget.
pub const TRUNCATION_MARKER: &str = "[TRUNCATED]";

/// Sanitize `html` and bound the result to `max_chars` characters
/// (plus [`TRUNCATION_MARKER`] when cut). `None` uses [`DEFAULT_MAX_CHARS`].
pub fn sanitize_html(html: &str, max_chars: Option<usize>) -> String {
    let budget = max_chars.unwrap_or(DEFAULT_MAX_CHARS);

    // Removing one element can stitch a new tag together from its
    // neighbours, so run the passes until nothing changes.
    let mut current = html.to_string();
    loop {
        let next = run_passes(&current);
        if next == current {
            break;
        }
        current = next;
    }

    let original_len = html.len();
    let result = truncate(current, budget);
    trace!(original_len, sanitized_len = result.len(), "sanitized html");
    result
}

/// Plain visible text of a page, bounded to `max_chars` characters.
pub fn visible_text(html: &str, max_chars: usize) -> String {
    let sanitized = sanitize_html(html, Some(usize::MAX));
    let text = passes::strip_tags(&sanitized);
    text.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Strip tags from a fragment and decode common entities.
///
/// Used to clean values captured by extraction patterns, e.g.
/// `<h1><span>Door&nbsp;Seal</span></h1>` becomes `Door Seal`.
pub fn strip_tags(fragment: &str) -> String {
    passes::strip_tags(fragment)
}

/// Decode the common named and numeric entities.
pub fn decode_entities(text: &str) -> String {
    passes::decode_entities(text)
}

fn run_passes(html: &str) -> String {
    let mut result = passes::drop_elements(html);
    result = passes::drop_comments(&result);
    result = passes::strip_attributes(&result);
    result = passes::collapse_whitespace(&result);
    result = passes::remove_empty_elements(&result);
    passes::collapse_whitespace(&result)
}

fn truncate(html: String, budget: usize) -> String {
    match html.char_indices().nth(budget) {
        Some((cut, _)) => {
            let mut out = html[..cut].to_string();
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Door Seal</title><style>.x { color: red }</style></head>
<body class="product">
  <header><nav><a href="/">Home</a></nav></header>
  <!-- tracking -->
  <main id="content">
    <h1 class="title" data-sku="DS-1">Door Seal</h1>
    <div class="spacer"></div>
    <img src="/img/seal.png" alt="Seal" loading="lazy">
    <a href="/docs/seal.pdf" class="dl">Datasheet</a>
    <table><tr><th>Width</th><td>10mm</td></tr></table>
    <form><input type="text"><button>Buy</button></form>
  </main>
  <script>window.dataLayer = [];</script>
  <footer>© 2026</footer>
</body>
</html>"#;

    #[test]
    fn removes_noise_and_keeps_structure() {
        let out = sanitize_html(PAGE, None);

        assert!(!out.contains("<script"));
        assert!(!out.contains("<style"));
        assert!(!out.contains("<!--"));
        assert!(!out.contains("Home"));
        assert!(!out.contains("Buy"));
        assert!(!out.contains("class="));
        assert!(!out.contains("<div>"));

        assert!(out.contains("<h1>Door Seal</h1>"));
        assert!(out.contains(r#"<img src="/img/seal.png">"#));
        assert!(out.contains(r#"<a href="/docs/seal.pdf">Datasheet</a>"#));
        assert!(out.contains("<th>Width</th><td>10mm</td>"));
    }

    #[test]
    fn output_is_bounded_by_budget() {
        let html = "<p>".to_string() + &"abcdef ".repeat(1000) + "</p>";
        let out = sanitize_html(&html, Some(100));
        assert!(out.chars().count() <= 100 + TRUNCATION_MARKER.len());
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn short_output_is_not_marked() {
        let out = sanitize_html("<p>hi</p>", Some(100));
        assert_eq!(out, "<p>hi</p>");
    }

    #[test]
    fn is_idempotent() {
        for budget in [None, Some(50), Some(10)] {
            let once = sanitize_html(PAGE, budget);
            assert_eq!(sanitize_html(&once, budget), once, "budget {budget:?}");
        }
    }

    #[test]
    fn adversarial_split_tags_are_removed() {
        let out = sanitize_html("<scr<b></b>ipt>x</script>", None);
        assert!(!out.to_ascii_lowercase().contains("<script"));
    }

    #[test]
    fn deeply_nested_split_tags_are_removed() {
        for depth in 1..=8 {
            let html = format!(
                "<p>ok</p><scr{}<b></b>{}ipt>alert(1)</script>",
                "<i class=x>".repeat(depth),
                "</i>".repeat(depth)
            );
            let out = sanitize_html(&html, None);
            assert!(!out.to_ascii_lowercase().contains("<script"), "depth {depth}: {out}");
            assert!(!out.contains("class="), "depth {depth}: {out}");
            assert!(out.starts_with("<p>ok</p>"));
            assert_eq!(sanitize_html(&out, None), out, "depth {depth}");
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let out = sanitize_html(&"é".repeat(20), Some(5));
        assert_eq!(out, format!("ééééé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn visible_text_is_plain() {
        let text = visible_text(PAGE, 200);
        assert!(text.contains("Door Seal"));
        assert!(text.contains("Width 10mm"));
        assert!(!text.contains('<'));
        assert!(!text.contains("dataLayer"));
    }

    #[test]
    fn visible_text_bounded() {
        assert_eq!(visible_text("<p>abcdefgh</p>", 3), "abc");
    }
}
