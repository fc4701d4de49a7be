//! URL helpers shared by discovery and scraping.

use url::Url;

use crate::error::{ProdScoutError, Result};

/// Extract the origin (scheme + host + port) from a URL.
pub fn origin_url(url: &Url) -> Result<String> {
    let scheme = url.scheme();
    let host = url
        .host_str()
        .ok_or_else(|| ProdScoutError::validation(format!("URL has no host: {url}")))?;

    match url.port() {
        Some(port) => Ok(format!("{scheme}://{host}:{port}")),
        None => Ok(format!("{scheme}://{host}")),
    }
}

/// Resolve `href` against `base`, returning an absolute http(s) URL without
/// fragment. Anchors, `javascript:`, `mailto:` and `tel:` links yield `None`.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim().replace("&amp;", "&");
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }

    let mut resolved = base.join(&href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Like [`resolve_url`], but `base` is a string that may fail to parse.
pub fn resolve_against(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    resolve_url(&base, href)
}

/// Whether a URL points at a PDF document (ignoring query string).
pub fn is_pdf_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".pdf")
}

/// Last non-empty path segment of a URL, without a file extension.
pub fn last_path_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 => stem,
        _ => segment,
    };
    Some(stem.to_string())
}

/// Turn a URL slug into a display name: `fire-door_seal` → `Fire Door Seal`.
pub fn title_case_slug(slug: &str) -> String {
    slug.split(['-', '_', '+', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
