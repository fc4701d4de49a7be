//! Job configuration: one declarative description of one pipeline run.
//!
//! Job files (TOML or JSON) deserialize into [`JobSpec`], a closed family
//! tagged by `type`. [`JobSpec::compile`] validates URLs, compiles every regex
//! pattern, and resolves request tuning against [`DefaultsConfig`], producing
//! an immutable [`JobConfig`]. All configuration errors surface here, before
//! any network work starts.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::budget::Deadline;
use crate::config::DefaultsConfig;
use crate::error::{ProdScoutError, Result};
use crate::fetch::FetchOptions;
use crate::pattern::Pattern;

/// Placeholder substituted with the page number in pagination templates.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Link pattern used for PDFs when a method needs one and none is configured.
pub const DEFAULT_PDF_PATTERN: &str = r#"href\s*=\s*["']([^"']+?\.pdf(?:\?[^"']*)?)["']"#;

/// Two-cell table row pattern used when no spec pattern is configured.
pub const DEFAULT_SPEC_ROW_PATTERN: &str =
    r"<tr[^>]*>\s*<t[hd][^>]*>(.*?)</t[hd]>\s*<td[^>]*>(.*?)</td>\s*</tr>";

// ---------------------------------------------------------------------------
// Raw job files
// ---------------------------------------------------------------------------

/// Request tuning as written in a job file. Unset fields use app defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSpec {
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub time_budget_secs: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// A job file, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobSpec {
    Generic(GenericSpec),
    Shopify(ShopifySpec),
    Browser(BrowserSpec),
    Regulation(RegulationSpec),
    Ai(AiSpec),
}

/// `type = "generic"`: the configurable scraper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub listing_urls: Vec<String>,
    #[serde(default)]
    pub pagination: Option<PaginationSpec>,
    #[serde(default)]
    pub detail: Option<DetailSpec>,
    #[serde(default)]
    pub api: Option<ApiSpec>,
    #[serde(default)]
    pub request: RequestSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSpec {
    /// URL with a `{page}` placeholder.
    pub url_template: String,
    /// First page number substituted after the listing URLs.
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    /// Last page number fetched.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_start_page() -> u32 {
    2
}
fn default_max_pages() -> u32 {
    10
}

/// `[detail]` block, tagged by `method`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum DetailSpec {
    ListingOnly {
        link_pattern: String,
        #[serde(default)]
        name_pattern: Option<String>,
    },
    Sitemap {
        link_pattern: String,
    },
    JsonLd {
        link_pattern: String,
        #[serde(default = "default_schema_type")]
        schema_type: String,
        #[serde(default)]
        pdf_pattern: Option<String>,
    },
    Html(HtmlPatternSpec),
}

fn default_schema_type() -> String {
    "Product".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlPatternSpec {
    pub link_pattern: String,
    pub name_pattern: String,
    #[serde(default)]
    pub code_pattern: Option<String>,
    #[serde(default)]
    pub description_pattern: Option<String>,
    /// Two capture groups: key, value.
    #[serde(default)]
    pub spec_pattern: Option<String>,
    #[serde(default)]
    pub pdf_pattern: Option<String>,
    #[serde(default)]
    pub image_pattern: Option<String>,
    #[serde(default)]
    pub price_pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// `[api]` block: one JSON request mapped through field paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSpec {
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Dot path to the results array; empty means the response root.
    #[serde(default)]
    pub results_path: String,
    pub fields: ApiFields,
}

/// Dot paths into each result item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiFields {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pdf: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// `type = "shopify"`: the commerce platform adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopifySpec {
    pub store_url: String,
    #[serde(default = "default_currency_prefix")]
    pub currency_prefix: String,
    /// Fetch each product page for PDF links.
    #[serde(default = "default_true")]
    pub scan_product_pages: bool,
    /// Fetch installation/application guide pages per SKU prefix.
    #[serde(default = "default_true")]
    pub fetch_guides: bool,
    /// Minimum remaining budget before guide fetching is attempted.
    #[serde(default = "default_guide_min_remaining_secs")]
    pub guide_min_remaining_secs: u64,
    #[serde(default)]
    pub request: RequestSpec,
}

fn default_currency_prefix() -> String {
    "£".into()
}
fn default_true() -> bool {
    true
}
fn default_guide_min_remaining_secs() -> u64 {
    30
}

/// `type = "browser"`: headless listing/detail automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSpec {
    pub listing_url: String,
    pub selectors: BrowserSelectors,
    #[serde(default)]
    pub pagination: Option<BrowserPagination>,
    #[serde(default)]
    pub max_products: Option<usize>,
    /// Extra settle time after each navigation, in ms.
    #[serde(default)]
    pub wait_ms: u64,
    #[serde(default)]
    pub request: RequestSpec,
}

/// CSS selectors for the browser driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSelectors {
    /// Anchor elements linking to detail pages on the listing.
    pub product_link: String,
    /// Name element inside each product link; the link text when unset.
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_spec_rows")]
    pub spec_rows: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default = "default_pdf_links")]
    pub pdf_links: String,
}

fn default_spec_rows() -> String {
    "table tr".into()
}
fn default_pdf_links() -> String {
    r#"a[href$=".pdf"], a[href*=".pdf?"]"#.into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserPagination {
    /// Element to click for the next page.
    pub next_selector: String,
    #[serde(default = "default_browser_max_pages")]
    pub max_pages: u32,
}

fn default_browser_max_pages() -> u32 {
    5
}

/// `type = "regulation"`: heading-delimited regulation text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulationSpec {
    pub url: String,
    #[serde(default = "default_section_selector")]
    pub section_selector: String,
    /// Reference code pattern applied to each heading.
    #[serde(default)]
    pub ref_pattern: Option<String>,
    #[serde(default)]
    pub wait_ms: u64,
    #[serde(default)]
    pub request: RequestSpec,
}

fn default_section_selector() -> String {
    "h2, h3".into()
}

/// `type = "ai"`: discovery + AI extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSpec {
    pub site_url: String,
    pub manufacturer: String,
    #[serde(default = "default_goal")]
    pub goal: String,
    #[serde(default = "default_ai_max_products")]
    pub max_products: usize,
    #[serde(default)]
    pub request: RequestSpec,
}

fn default_goal() -> String {
    "Find every product this manufacturer sells, with its datasheets.".into()
}
fn default_ai_max_products() -> usize {
    100
}

// ---------------------------------------------------------------------------
// Compiled job configuration
// ---------------------------------------------------------------------------

/// Request tuning after merging job overrides with app defaults.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub delay: Duration,
    pub timeout_secs: u64,
    pub batch_size: usize,
    pub time_budget: Duration,
    pub headers: BTreeMap<String, String>,
}

impl RequestSettings {
    fn resolve(spec: &RequestSpec, defaults: &DefaultsConfig) -> Result<Self> {
        let batch_size = spec.batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(ProdScoutError::config("batch_size must be at least 1"));
        }
        Ok(Self {
            delay: Duration::from_millis(spec.delay_ms.unwrap_or(defaults.delay_ms)),
            timeout_secs: spec.timeout_secs.unwrap_or(defaults.timeout_secs),
            batch_size,
            time_budget: Duration::from_secs(
                spec.time_budget_secs.unwrap_or(defaults.time_budget_secs),
            ),
            headers: spec.headers.clone(),
        })
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout_secs: self.timeout_secs,
            headers: self.headers.clone(),
        }
    }

    /// Start the run-wide clock.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.time_budget)
    }
}

/// A validated job ready to run.
#[derive(Debug, Clone)]
pub enum JobConfig {
    Generic(GenericConfig),
    Shopify(ShopifyConfig),
    Browser(BrowserConfig),
    Regulation(RegulationConfig),
    Ai(AiConfig),
}

impl JobConfig {
    pub fn request(&self) -> &RequestSettings {
        match self {
            Self::Generic(c) => &c.request,
            Self::Shopify(c) => &c.request,
            Self::Browser(c) => &c.request,
            Self::Regulation(c) => &c.request,
            Self::Ai(c) => &c.request,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generic(_) => "generic",
            Self::Shopify(_) => "shopify",
            Self::Browser(_) => "browser",
            Self::Regulation(_) => "regulation",
            Self::Ai(_) => "ai",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenericConfig {
    pub name: Option<String>,
    pub listing_urls: Vec<Url>,
    pub pagination: Option<Pagination>,
    pub method: ExtractionMethod,
    pub request: RequestSettings,
}

#[derive(Debug, Clone)]
pub struct Pagination {
    pub url_template: String,
    pub start_page: u32,
    pub max_pages: u32,
}

impl Pagination {
    /// URL for a page number.
    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace(PAGE_PLACEHOLDER, &page.to_string())
    }
}

/// How product records are produced; one case per strategy.
#[derive(Debug, Clone)]
pub enum ExtractionMethod {
    ListingOnly {
        link: Pattern,
        name: Option<Pattern>,
    },
    Sitemap {
        link: Pattern,
    },
    JsonLd {
        link: Pattern,
        schema_type: String,
        pdf: Pattern,
    },
    Html(HtmlPatterns),
    Api(ApiConfig),
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListingOnly { .. } => "listing-only",
            Self::Sitemap { .. } => "sitemap",
            Self::JsonLd { .. } => "json-ld",
            Self::Html(_) => "html",
            Self::Api(_) => "api",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HtmlPatterns {
    pub link: Pattern,
    pub name: Pattern,
    pub code: Option<Pattern>,
    pub description: Option<Pattern>,
    pub specs: Pattern,
    pub pdf: Pattern,
    pub image: Option<Pattern>,
    pub price: Option<Pattern>,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub endpoint: Url,
    pub method: HttpMethod,
    pub body: Option<serde_json::Value>,
    pub results_path: String,
    pub fields: ApiFields,
}

#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    pub store_url: Url,
    pub currency_prefix: String,
    pub scan_product_pages: bool,
    pub fetch_guides: bool,
    pub guide_min_remaining: Duration,
    pub request: RequestSettings,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub listing_url: Url,
    pub selectors: BrowserSelectors,
    pub pagination: Option<BrowserPagination>,
    pub max_products: Option<usize>,
    pub wait: Duration,
    pub request: RequestSettings,
}

#[derive(Debug, Clone)]
pub struct RegulationConfig {
    pub url: Url,
    pub section_selector: String,
    pub ref_pattern: Option<Pattern>,
    pub wait: Duration,
    pub request: RequestSettings,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub site_url: Url,
    pub manufacturer: String,
    pub goal: String,
    pub max_products: usize,
    pub request: RequestSettings,
}

// ---------------------------------------------------------------------------
// Loading and compilation
// ---------------------------------------------------------------------------

impl JobSpec {
    /// Read a job file; `.json` files are JSON, everything else is TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProdScoutError::io(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content).map_err(|e| {
                ProdScoutError::config(format!("failed to parse {}: {e}", path.display()))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                ProdScoutError::config(format!("failed to parse {}: {e}", path.display()))
            })
        }
    }

    /// Validate and compile into a runnable [`JobConfig`].
    pub fn compile(&self, defaults: &DefaultsConfig) -> Result<JobConfig> {
        match self {
            Self::Generic(spec) => compile_generic(spec, defaults).map(JobConfig::Generic),
            Self::Shopify(spec) => Ok(JobConfig::Shopify(ShopifyConfig {
                store_url: parse_url("store_url", &spec.store_url)?,
                currency_prefix: spec.currency_prefix.clone(),
                scan_product_pages: spec.scan_product_pages,
                fetch_guides: spec.fetch_guides,
                guide_min_remaining: Duration::from_secs(spec.guide_min_remaining_secs),
                request: RequestSettings::resolve(&spec.request, defaults)?,
            })),
            Self::Browser(spec) => Ok(JobConfig::Browser(BrowserConfig {
                listing_url: parse_url("listing_url", &spec.listing_url)?,
                selectors: spec.selectors.clone(),
                pagination: spec.pagination.clone(),
                max_products: spec.max_products,
                wait: Duration::from_millis(spec.wait_ms),
                request: RequestSettings::resolve(&spec.request, defaults)?,
            })),
            Self::Regulation(spec) => Ok(JobConfig::Regulation(RegulationConfig {
                url: parse_url("url", &spec.url)?,
                section_selector: spec.section_selector.clone(),
                ref_pattern: Pattern::compile_opt("ref_pattern", spec.ref_pattern.as_deref())?,
                wait: Duration::from_millis(spec.wait_ms),
                request: RequestSettings::resolve(&spec.request, defaults)?,
            })),
            Self::Ai(spec) => {
                if spec.manufacturer.trim().is_empty() {
                    return Err(ProdScoutError::config("manufacturer must not be empty"));
                }
                Ok(JobConfig::Ai(AiConfig {
                    site_url: parse_url("site_url", &spec.site_url)?,
                    manufacturer: spec.manufacturer.trim().to_string(),
                    goal: spec.goal.clone(),
                    max_products: spec.max_products,
                    request: RequestSettings::resolve(&spec.request, defaults)?,
                }))
            }
        }
    }
}

fn compile_generic(spec: &GenericSpec, defaults: &DefaultsConfig) -> Result<GenericConfig> {
    let request = RequestSettings::resolve(&spec.request, defaults)?;

    let listing_urls = spec
        .listing_urls
        .iter()
        .map(|u| parse_url("listing_urls", u))
        .collect::<Result<Vec<_>>>()?;

    let pagination = match &spec.pagination {
        Some(p) => {
            if !p.url_template.contains(PAGE_PLACEHOLDER) {
                return Err(ProdScoutError::config(format!(
                    "pagination.url_template must contain {PAGE_PLACEHOLDER}"
                )));
            }
            parse_url("pagination.url_template", &p.url_template.replace(PAGE_PLACEHOLDER, "1"))?;
            Some(Pagination {
                url_template: p.url_template.clone(),
                start_page: p.start_page,
                max_pages: p.max_pages,
            })
        }
        None => None,
    };

    // An API block wins over any detail block.
    let method = if let Some(api) = &spec.api {
        ExtractionMethod::Api(ApiConfig {
            endpoint: parse_url("api.endpoint", &api.endpoint)?,
            method: api.method,
            body: api.body.clone(),
            results_path: api.results_path.clone(),
            fields: api.fields.clone(),
        })
    } else {
        let detail = spec.detail.as_ref().ok_or_else(|| {
            ProdScoutError::config("generic job needs either a [detail] or an [api] block")
        })?;
        if listing_urls.is_empty() {
            return Err(ProdScoutError::config("listing_urls must not be empty"));
        }
        compile_detail(detail)?
    };

    Ok(GenericConfig {
        name: spec.name.clone(),
        listing_urls,
        pagination,
        method,
        request,
    })
}

fn compile_detail(detail: &DetailSpec) -> Result<ExtractionMethod> {
    Ok(match detail {
        DetailSpec::ListingOnly {
            link_pattern,
            name_pattern,
        } => ExtractionMethod::ListingOnly {
            link: Pattern::compile("link_pattern", link_pattern)?,
            name: Pattern::compile_opt("name_pattern", name_pattern.as_deref())?,
        },
        DetailSpec::Sitemap { link_pattern } => ExtractionMethod::Sitemap {
            link: Pattern::compile("link_pattern", link_pattern)?,
        },
        DetailSpec::JsonLd {
            link_pattern,
            schema_type,
            pdf_pattern,
        } => ExtractionMethod::JsonLd {
            link: Pattern::compile("link_pattern", link_pattern)?,
            schema_type: schema_type.clone(),
            pdf: Pattern::compile(
                "pdf_pattern",
                pdf_pattern.as_deref().unwrap_or(DEFAULT_PDF_PATTERN),
            )?,
        },
        DetailSpec::Html(p) => ExtractionMethod::Html(HtmlPatterns {
            link: Pattern::compile("link_pattern", &p.link_pattern)?,
            name: Pattern::compile("name_pattern", &p.name_pattern)?,
            code: Pattern::compile_opt("code_pattern", p.code_pattern.as_deref())?,
            description: Pattern::compile_opt(
                "description_pattern",
                p.description_pattern.as_deref(),
            )?,
            specs: Pattern::compile(
                "spec_pattern",
                p.spec_pattern.as_deref().unwrap_or(DEFAULT_SPEC_ROW_PATTERN),
            )?,
            pdf: Pattern::compile(
                "pdf_pattern",
                p.pdf_pattern.as_deref().unwrap_or(DEFAULT_PDF_PATTERN),
            )?,
            image: Pattern::compile_opt("image_pattern", p.image_pattern.as_deref())?,
            price: Pattern::compile_opt("price_pattern", p.price_pattern.as_deref())?,
        }),
    })
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ProdScoutError::config(format!("`{field}`: invalid URL {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProdScoutError::config(format!(
            "`{field}`: unsupported scheme {other:?} in {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_toml(src: &str) -> Result<JobConfig> {
        let spec: JobSpec = toml::from_str(src).expect("parse job");
        spec.compile(&DefaultsConfig::default())
    }

    #[test]
    fn html_job_compiles_with_defaults() {
        let job = compile_toml(
            r#"
type = "generic"
listing_urls = ["https://a.test/range"]

[detail]
method = "html"
link_pattern = 'href="(/product/[^"]+)"'
name_pattern = '<h1[^>]*>(.*?)</h1>'

[request]
batch_size = 3
"#,
        )
        .expect("compile");

        let JobConfig::Generic(cfg) = job else {
            panic!("expected generic job");
        };
        assert_eq!(cfg.method.as_str(), "html");
        assert_eq!(cfg.request.batch_size, 3);
        assert_eq!(cfg.request.delay, Duration::from_millis(500));
    }

    #[test]
    fn api_block_wins_over_detail() {
        let job = compile_toml(
            r#"
type = "generic"

[api]
endpoint = "https://api.a.test/v1/products"
method = "POST"
results_path = "data.items"

[api.fields]
name = "title"

[detail]
method = "sitemap"
link_pattern = "<loc>(.*?)</loc>"
"#,
        )
        .expect("compile");
        let JobConfig::Generic(cfg) = job else {
            panic!("expected generic job");
        };
        match cfg.method {
            ExtractionMethod::Api(api) => assert_eq!(api.method, HttpMethod::Post),
            other => panic!("expected api, got {}", other.as_str()),
        }
    }

    #[test]
    fn bad_pattern_fails_at_load_time() {
        let err = compile_toml(
            r#"
type = "generic"
listing_urls = ["https://a.test/"]

[detail]
method = "listing-only"
link_pattern = "href=\"([^\"]+"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("link_pattern"));
    }

    #[test]
    fn pagination_requires_placeholder() {
        let err = compile_toml(
            r#"
type = "generic"
listing_urls = ["https://a.test/"]

[pagination]
url_template = "https://a.test/?page=2"

[detail]
method = "sitemap"
link_pattern = "<loc>(.*?)</loc>"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("{page}"));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = compile_toml(
            r#"
type = "shopify"
store_url = "https://shop.a.test"

[request]
batch_size = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn json_job_file_loads() {
        let dir = std::env::temp_dir().join("prodscout-job-test");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("job.json");
        std::fs::write(
            &path,
            r#"{"type":"ai","site_url":"https://a.test","manufacturer":"Acme"}"#,
        )
        .expect("write");

        let spec = JobSpec::load(&path).expect("load");
        let job = spec.compile(&DefaultsConfig::default()).expect("compile");
        assert_eq!(job.kind(), "ai");
        assert_eq!(job.request().time_budget, Duration::from_secs(270));
    }

    #[test]
    fn page_url_substitutes_placeholder() {
        let p = Pagination {
            url_template: "https://a.test/range?page={page}".into(),
            start_page: 2,
            max_pages: 4,
        };
        assert_eq!(p.page_url(3), "https://a.test/range?page=3");
    }
}
