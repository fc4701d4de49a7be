//! Sitemap probing.
//!
//! Candidate product URLs come from `/sitemap.xml`, `/sitemap_index.xml`, and
//! every `Sitemap:` directive of `/robots.txt`. Index files are followed one
//! level deep. Only product-shaped paths are kept.

use std::collections::HashSet;
use std::io::Cursor;

use ::sitemap::reader::{SiteMapEntity, SiteMapReader};
use robotstxt::{RobotsParseHandler, parse_robotstxt};
use tracing::{debug, info, instrument};
use url::Url;

use prodscout_shared::urls::origin_url;
use prodscout_shared::{HttpFetcher, dedup_urls};

/// Cap on product URLs returned by discovery.
pub const MAX_PRODUCT_URLS: usize = 500;

/// Child sitemaps followed per index file.
pub const MAX_CHILD_SITEMAPS: usize = 10;

/// Path fragments that mark a product-shaped URL.
const PRODUCT_PATH_KEYWORDS: &[&str] = &[
    "/product/",
    "/products/",
    "/shop/",
    "/catalogue/",
    "/catalog/",
    "/item/",
    "/range/",
];

/// Probe the site's sitemaps for product URLs.
///
/// Never fails: unreachable or malformed sitemaps contribute nothing.
#[instrument(skip_all, fields(site = %site))]
pub async fn probe_sitemaps(fetcher: &HttpFetcher, site: &Url) -> Vec<String> {
    let Ok(origin) = origin_url(site) else {
        return Vec::new();
    };

    let mut roots = vec![
        format!("{origin}/sitemap.xml"),
        format!("{origin}/sitemap_index.xml"),
    ];
    if let Some(robots) = fetcher.fetch_optional(&format!("{origin}/robots.txt")).await {
        for declared in robots_sitemaps(&robots) {
            if !roots.contains(&declared) {
                roots.push(declared);
            }
        }
    }

    let mut probe = Probe::default();
    for root in roots {
        if probe.found.len() >= MAX_PRODUCT_URLS {
            break;
        }
        let children = probe.read(fetcher, &root).await;
        for child in children.into_iter().take(MAX_CHILD_SITEMAPS) {
            // Indexes inside a child are not followed further.
            probe.read(fetcher, &child).await;
        }
    }

    let urls = dedup_urls(probe.found, MAX_PRODUCT_URLS);
    info!(count = urls.len(), "sitemap probe finished");
    urls
}

/// Visited sitemaps and the unique product URLs collected so far.
#[derive(Default)]
struct Probe {
    visited: HashSet<String>,
    seen: HashSet<String>,
    found: Vec<String>,
}

impl Probe {
    /// Fetch one sitemap, keep its new product URLs, and return the nested
    /// sitemap URLs it lists.
    async fn read(&mut self, fetcher: &HttpFetcher, url: &str) -> Vec<String> {
        if !self.visited.insert(url.to_string()) {
            return Vec::new();
        }
        let Some(xml) = fetcher.fetch_optional(url).await else {
            return Vec::new();
        };

        let locs = parse_sitemap(&xml);
        let mut products = 0usize;
        for page in locs.pages {
            if is_product_path(&page) && self.seen.insert(page.clone()) {
                self.found.push(page);
                products += 1;
            }
        }
        debug!(%url, products, nested = locs.sitemaps.len(), "read sitemap");
        locs.sitemaps
    }
}

/// `<loc>` values of one sitemap document, split into pages and nested
/// sitemaps.
#[derive(Debug, Default, PartialEq)]
pub struct SitemapLocs {
    pub pages: Vec<String>,
    pub sitemaps: Vec<String>,
}

/// Parse a sitemap or sitemap index. Every location, from `<url>` and
/// `<sitemap>` entries alike, is a nested sitemap when it is sitemap-shaped
/// and a page otherwise.
pub fn parse_sitemap(xml: &str) -> SitemapLocs {
    let mut locs = SitemapLocs::default();
    for entity in SiteMapReader::new(Cursor::new(xml.as_bytes())) {
        let url = match entity {
            SiteMapEntity::Url(entry) => entry.loc.get_url(),
            SiteMapEntity::SiteMap(entry) => entry.loc.get_url(),
            SiteMapEntity::Err(_) => None,
        };
        let Some(url) = url.map(|u| u.to_string()) else {
            continue;
        };
        if is_nested_sitemap(&url) {
            locs.sitemaps.push(url);
        } else {
            locs.pages.push(url);
        }
    }
    locs
}

/// Collects `Sitemap:` directives while robots.txt is parsed.
#[derive(Default)]
struct SitemapDirectives(Vec<String>);

impl RobotsParseHandler for SitemapDirectives {
    fn handle_robots_start(&mut self) {}
    fn handle_robots_end(&mut self) {}
    fn handle_user_agent(&mut self, _line_num: u32, _user_agent: &str) {}
    fn handle_allow(&mut self, _line_num: u32, _value: &str) {}
    fn handle_disallow(&mut self, _line_num: u32, _value: &str) {}

    fn handle_sitemap(&mut self, _line_num: u32, value: &str) {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            self.0.push(value.to_string());
        }
    }

    fn handle_unknown_action(&mut self, _line_num: u32, _action: &str, _value: &str) {}
}

/// Absolute sitemap URLs declared in a robots.txt body.
pub fn robots_sitemaps(robots: &str) -> Vec<String> {
    let mut directives = SitemapDirectives::default();
    parse_robotstxt(robots, &mut directives);
    directives.0
}

/// A `<loc>` that points at another sitemap rather than a page.
pub fn is_nested_sitemap(loc: &str) -> bool {
    let lower = loc.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    path.contains("sitemap") && path.ends_with(".xml")
}

/// Whether a page URL looks like a product page.
pub fn is_product_path(loc: &str) -> bool {
    let Ok(url) = Url::parse(loc) else {
        return false;
    };
    let path = url.path().to_ascii_lowercase();
    PRODUCT_PATH_KEYWORDS.iter().any(|kw| path.contains(kw))
}
