//! Product identity from URL paths, for sitemap-only extraction.
//!
//! Heuristics are tried in order; the first that recognizes the path wins.
//! The last one always answers.

use url::Url;

use prodscout_shared::ScrapedProduct;
use prodscout_shared::urls::{last_path_segment, title_case_slug};

/// What a URL path says about its product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlIdentity {
    pub name: String,
    pub code: Option<String>,
    pub category: Option<String>,
}

type Heuristic = fn(&[&str]) -> Option<UrlIdentity>;

/// Heuristics in priority order.
const HEURISTICS: &[Heuristic] = &[code_then_slug, category_then_slug, last_segment];

/// Markers followed by `<code>/<slug>`.
const CODE_MARKERS: &[&str] = &["product", "p", "item"];

/// Markers followed by `<category>/<slug>`.
const CATEGORY_MARKERS: &[&str] = &["products", "catalogue", "catalog", "range", "shop"];

/// Identify the product behind a URL.
pub fn identify(url: &Url) -> Option<UrlIdentity> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    HEURISTICS.iter().find_map(|h| h(&segments))
}

/// Build a product record from a URL alone.
pub fn product_from_url(url: &Url) -> Option<ScrapedProduct> {
    let identity = identify(url)?;
    let mut product = ScrapedProduct::named(identity.name)?;
    product.product_code = identity.code;
    if let Some(category) = identity.category {
        product.specifications.insert("Category", category);
    }
    product.source_url = Some(url.to_string());
    Some(product)
}

/// `/product/<code>/<slug>` where the code carries a digit.
fn code_then_slug(segments: &[&str]) -> Option<UrlIdentity> {
    let at = segments
        .iter()
        .position(|s| CODE_MARKERS.contains(&s.to_ascii_lowercase().as_str()))?;
    let [code, slug] = segments.get(at + 1..at + 3)? else {
        return None;
    };
    if !code.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(UrlIdentity {
        name: title_case_slug(strip_extension(slug)),
        code: Some(code.to_ascii_uppercase()),
        category: None,
    })
}

/// `/products/<category>/<slug>` as the final two segments.
fn category_then_slug(segments: &[&str]) -> Option<UrlIdentity> {
    let at = segments
        .iter()
        .position(|s| CATEGORY_MARKERS.contains(&s.to_ascii_lowercase().as_str()))?;
    let [category, slug] = segments.get(at + 1..)? else {
        return None;
    };
    Some(UrlIdentity {
        name: title_case_slug(strip_extension(slug)),
        code: None,
        category: Some(title_case_slug(category)),
    })
}

/// Title-cased last segment.
fn last_segment(segments: &[&str]) -> Option<UrlIdentity> {
    let slug = segments.last()?;
    let name = title_case_slug(strip_extension(slug));
    (!name.is_empty()).then_some(UrlIdentity {
        name,
        code: None,
        category: None,
    })
}

fn strip_extension(segment: &str) -> &str {
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 => stem,
        _ => segment,
    }
}

/// Name for a URL when nothing better is known.
pub fn slug_name(url: &Url) -> Option<String> {
    last_path_segment(url).map(|s| title_case_slug(&s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str) -> UrlIdentity {
        identify(&Url::parse(url).unwrap()).expect("identity")
    }

    #[test]
    fn code_then_slug_paths() {
        let i = id("https://a.test/product/fs120/fire-stop-sealant");
        assert_eq!(i.name, "Fire Stop Sealant");
        assert_eq!(i.code.as_deref(), Some("FS120"));
    }

    #[test]
    fn code_without_digit_falls_through() {
        let i = id("https://a.test/products/doors/fire-door.html");
        assert_eq!(i.name, "Fire Door");
        assert_eq!(i.category.as_deref(), Some("Doors"));
        assert_eq!(i.code, None);
    }

    #[test]
    fn category_needs_exactly_two_trailing_segments() {
        let i = id("https://a.test/shop/seals/smoke/ss-10");
        assert_eq!(i.name, "Ss 10");
        assert_eq!(i.category, None);
    }

    #[test]
    fn root_has_no_identity() {
        assert!(identify(&Url::parse("https://a.test/").unwrap()).is_none());
    }

    #[test]
    fn product_from_url_sets_category_spec() {
        let p = product_from_url(&Url::parse("https://a.test/range/glazing/vision-panel").unwrap())
            .unwrap();
        assert_eq!(p.product_name, "Vision Panel");
        assert_eq!(p.specifications.get("Category"), Some("Glazing"));
        assert_eq!(p.source_url.as_deref(), Some("https://a.test/range/glazing/vision-panel"));
    }
}
