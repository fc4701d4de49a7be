//! Shopify storefront adapter.
//!
//! Three phases, each reported through the progress channel:
//! 1. page through `/products.json` and map every catalog item;
//! 2. scan each product page for absolute PDF links;
//! 3. when enough budget remains, attach installation/application guide
//!    text shared by products with the same SKU prefix.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use prodscout_sanitize::visible_text;
use prodscout_shared::urls::origin_url;
use prodscout_shared::{Deadline, HttpFetcher, ProgressSink, Result, ScrapedProduct, ShopifyConfig};

use crate::batch::{BatchPlan, run_batches};

/// Items per catalog page (Shopify's maximum).
pub const PAGE_SIZE: usize = 250;

/// Catalog pages fetched at most.
pub const MAX_CATALOG_PAGES: u32 = 10;

/// Guide text attached to a product is cut to this many characters.
pub const GUIDE_MAX_CHARS: usize = 2_000;

const DESCRIPTION_MAX_CHARS: usize = 5_000;
const QUOTE_ON_REQUEST: &str = "Quote on request";
const DEFAULT_VARIANT_TITLE: &str = "Default Title";

const STAGE_CATALOG: &str = "catalog";
const STAGE_PAGES: &str = "product-pages";
const STAGE_GUIDES: &str = "guides";

/// Guide pages looked up per SKU prefix: (URL suffix, specification key).
const GUIDES: &[(&str, &str)] = &[
    ("installation-guide", "Installation Guide"),
    ("application-guide", "Application Guide"),
];

static STANDARDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:BS EN|BS|EN|ISO|UL|ASTM)\s?\d{2,5}(?:[-:]\d+)*").expect("valid regex")
});
static FIRE_RATING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:FD\d{2,3}S?|EI\s?\d{2,3}|E\s?\d{2,3})\b").expect("valid regex")
});
static PDF_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^"'\s<>]+\.pdf(?:\?[^"'\s<>]*)?"#).expect("valid regex")
});

// ---------------------------------------------------------------------------
// Catalog wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    products: Vec<CatalogProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogProduct {
    pub title: String,
    pub handle: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Tags arrive as an array from `/products.json` and as a comma list elsewhere.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    List(Vec<String>),
    Joined(String),
}

impl Default for Tags {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl Tags {
    fn values(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Joined(joined) => joined.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Variant {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub src: String,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Map one catalog item to a product record.
pub fn map_catalog_product(item: &CatalogProduct, origin: &str, currency_prefix: &str) -> Option<ScrapedProduct> {
    let mut product = ScrapedProduct::named(&item.title)?;

    product.product_code = item
        .variants
        .iter()
        .filter_map(|v| v.sku.as_deref().map(str::trim))
        .find(|sku| !sku.is_empty())
        .map(str::to_string);

    let description = item
        .body_html
        .as_deref()
        .map(|html| visible_text(html, DESCRIPTION_MAX_CHARS))
        .unwrap_or_default();

    let mut category: Vec<String> = item
        .product_type
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    category.extend(item.tags.values());
    if !category.is_empty() {
        product.specifications.insert("Category", category.join(", "));
    }

    let standards = unique_matches(&STANDARDS_RE, &description);
    if !standards.is_empty() {
        product.specifications.insert("Test Standards", standards.join(", "));
    }
    let ratings = unique_matches(&FIRE_RATING_RE, &description);
    if !ratings.is_empty() {
        product.specifications.insert("Fire Rating", ratings.join(", "));
    }

    if !item.variants.is_empty() {
        product.specifications.insert("Variants", item.variants.len().to_string());
    }
    if let Some(vendor) = item.vendor.as_deref() {
        product.specifications.insert("Vendor", vendor.trim());
    }

    let sizes: Vec<&str> = item
        .variants
        .iter()
        .filter_map(|v| v.title.as_deref().map(str::trim))
        .filter(|t| !t.is_empty() && *t != DEFAULT_VARIANT_TITLE)
        .collect();
    if sizes.len() > 1 {
        product.specifications.insert("Available Sizes", sizes.join(", "));
    }

    product.price_text = Some(format_price(
        item.variants.first().and_then(|v| v.price.as_deref()),
        currency_prefix,
    ));
    product.description = (!description.is_empty()).then_some(description);

    for image in &item.images {
        let src = image.src.trim();
        if src.is_empty() {
            continue;
        }
        if let Some(rest) = src.strip_prefix("//") {
            product.push_image(format!("https://{rest}"));
        } else {
            product.push_image(src);
        }
    }

    product.source_url = Some(format!("{origin}/products/{}", item.handle));
    Some(product)
}

/// Price with the currency prefix, or "Quote on request" for zero/absent.
pub fn format_price(raw: Option<&str>, currency_prefix: &str) -> String {
    match raw.map(str::trim) {
        Some(price) if price.parse::<f64>().is_ok_and(|p| p > 0.0) => {
            format!("{currency_prefix}{price}")
        }
        _ => QUOTE_ON_REQUEST.to_string(),
    }
}

fn unique_matches(re: &Regex, text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let value = m.as_str().trim().to_string();
        if !found.contains(&value) {
            found.push(value);
        }
    }
    found
}

/// Absolute PDF URLs in a page body, deduplicated.
pub fn scan_pdf_links(html: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in PDF_URL_RE.find_iter(html) {
        let url = m.as_str().replace("&amp;", "&");
        if !found.contains(&url) {
            found.push(url);
        }
    }
    found
}

/// SKU prefix shared by a product family: the part before the first `-`,
/// else the leading letters. Lowercased.
pub fn sku_prefix(sku: &str) -> Option<String> {
    let sku = sku.trim();
    let prefix = match sku.split_once('-') {
        Some((head, _)) if !head.is_empty() => head.to_string(),
        _ => sku.chars().take_while(|c| c.is_ascii_alphabetic()).collect(),
    };
    (!prefix.is_empty()).then(|| prefix.to_ascii_lowercase())
}

// ---------------------------------------------------------------------------
// Scraper
// ---------------------------------------------------------------------------

/// Shopify storefront scraper for one job.
pub struct ShopifyScraper {
    config: ShopifyConfig,
    origin: String,
    fetcher: HttpFetcher,
}

impl ShopifyScraper {
    pub fn new(config: ShopifyConfig) -> Result<Self> {
        let origin = origin_url(&config.store_url)?;
        let fetcher = HttpFetcher::new(&config.request.fetch_options())?;
        Ok(Self {
            config,
            origin,
            fetcher,
        })
    }

    /// Run all phases. Never fails.
    #[instrument(skip_all, fields(store = %self.origin))]
    pub async fn scrape(&self, deadline: &Deadline, progress: &ProgressSink) -> Vec<ScrapedProduct> {
        let mut products = self.fetch_catalog(deadline, progress).await;

        if self.config.scan_product_pages && !products.is_empty() {
            self.attach_page_pdfs(&mut products, deadline, progress).await;
        }

        if self.config.fetch_guides && !products.is_empty() {
            if deadline.remaining() > self.config.guide_min_remaining {
                self.attach_guides(&mut products, deadline, progress).await;
            } else {
                info!("skipping guide pages, not enough time budget left");
            }
        }

        info!(products = products.len(), "shopify scrape finished");
        products
    }

    async fn fetch_catalog(&self, deadline: &Deadline, progress: &ProgressSink) -> Vec<ScrapedProduct> {
        let mut products = Vec::new();

        for page in 1..=MAX_CATALOG_PAGES {
            if deadline.is_expired() {
                warn!(page, "time budget exhausted during catalog paging");
                break;
            }
            let url = format!("{}/products.json?limit={PAGE_SIZE}&page={page}", self.origin);
            let json = match self.fetcher.get_json(&url).await {
                Ok(json) => json,
                Err(e) => {
                    warn!(page, error = %e, "catalog page failed");
                    break;
                }
            };
            let catalog: CatalogPage = match serde_json::from_value(json) {
                Ok(catalog) => catalog,
                Err(e) => {
                    warn!(page, error = %e, "unexpected catalog shape");
                    break;
                }
            };

            let count = catalog.products.len();
            products.extend(
                catalog
                    .products
                    .iter()
                    .filter_map(|item| map_catalog_product(item, &self.origin, &self.config.currency_prefix)),
            );
            progress.counts(STAGE_CATALOG, page as usize, MAX_CATALOG_PAGES as usize, products.len());
            debug!(page, count, "catalog page mapped");

            if count < PAGE_SIZE {
                break;
            }
        }

        products
    }

    async fn attach_page_pdfs(
        &self,
        products: &mut [ScrapedProduct],
        deadline: &Deadline,
        progress: &ProgressSink,
    ) {
        progress.phase(STAGE_PAGES, "scanning product pages for documents");
        let targets: Vec<(usize, String)> = products
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.source_url.clone().map(|u| (i, u)))
            .collect();

        let plan = BatchPlan::new(&self.config.request, deadline, progress, STAGE_PAGES);
        let found = run_batches(targets, &plan, |(index, url)| {
            let fetcher = self.fetcher.clone();
            async move {
                let html = fetcher.fetch_optional(&url).await?;
                Some((index, scan_pdf_links(&html)))
            }
        })
        .await;

        for (index, pdfs) in found {
            for pdf in pdfs {
                products[index].push_pdf(pdf);
            }
        }
    }

    async fn attach_guides(
        &self,
        products: &mut [ScrapedProduct],
        deadline: &Deadline,
        progress: &ProgressSink,
    ) {
        let prefixes: Vec<Option<String>> = products
            .iter()
            .map(|p| p.product_code.as_deref().and_then(sku_prefix))
            .collect();
        let mut unique: Vec<String> = prefixes.iter().flatten().cloned().collect();
        unique.sort();
        unique.dedup();
        if unique.is_empty() {
            return;
        }

        progress.phase(STAGE_GUIDES, format!("fetching guides for {} product families", unique.len()));
        let requests: Vec<(String, &'static str, String)> = unique
            .iter()
            .flat_map(|prefix| {
                GUIDES.iter().map(move |(suffix, key)| {
                    (
                        prefix.clone(),
                        *key,
                        format!("{}/pages/{prefix}-{suffix}", self.origin),
                    )
                })
            })
            .collect();

        let plan = BatchPlan::new(&self.config.request, deadline, progress, STAGE_GUIDES);
        let fetched = run_batches(requests, &plan, |(prefix, key, url)| {
            let fetcher = self.fetcher.clone();
            async move {
                let html = fetcher.fetch_optional(&url).await?;
                let text = visible_text(&html, GUIDE_MAX_CHARS);
                (!text.is_empty()).then_some((prefix, key, text))
            }
        })
        .await;

        let mut guides: HashMap<String, BTreeMap<&'static str, String>> = HashMap::new();
        for (prefix, key, text) in fetched {
            guides.entry(prefix).or_default().insert(key, text);
        }

        for (product, prefix) in products.iter_mut().zip(prefixes) {
            let Some(found) = prefix.and_then(|p| guides.get(&p)) else {
                continue;
            };
            for (_, key) in GUIDES {
                if let Some(text) = found.get(key) {
                    product.specifications.insert(*key, text.clone());
                }
            }
        }
        info!(families = guides.len(), "guide pages attached");
    }
}
