//! Headless browser driver for listing/detail sites and regulation text.
//!
//! The Chromium session only navigates and hands back rendered HTML. All DOM
//! extraction lives in pure functions ([`extract_listing`],
//! [`extract_detail`], [`extract_sections`]) so it can be tested without a
//! browser.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use futures::StreamExt;
use scraper::{ElementRef, Html, Selector};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use prodscout_shared::urls::resolve_url;
use prodscout_shared::{
    BrowserConfig, BrowserSelectors, Deadline, Pattern, ProdScoutError, ProgressSink, RegulationConfig,
    Result, ScrapedProduct, ScrapedSection, USER_AGENT, collapse_whitespace,
};

use crate::identity::slug_name;

/// Reference code at the start of a heading: `3`, `10.2.1`, `B1`, `B3.4`.
pub const DEFAULT_REF_PATTERN: &str = r"^\s*([A-Z]?\d+(?:\.\d+)*)\b";

/// Upper bound on waiting for a navigation to settle.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(10);

const STAGE_LISTING: &str = "browser-listing";
const STAGE_DETAIL: &str = "browser-detail";
const STAGE_SECTIONS: &str = "sections";

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

// ---------------------------------------------------------------------------
// Pure extraction
// ---------------------------------------------------------------------------

/// Name and absolute URL of one product on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub url: String,
}

/// [`BrowserSelectors`] parsed into CSS selectors.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub product_link: Selector,
    pub product_name: Option<Selector>,
    pub description: Option<Selector>,
    pub spec_rows: Selector,
    pub price: Option<Selector>,
    pub pdf_links: Selector,
}

impl CompiledSelectors {
    pub fn compile(selectors: &BrowserSelectors) -> Result<Self> {
        Ok(Self {
            product_link: css("selectors.product_link", &selectors.product_link)?,
            product_name: css_opt("selectors.product_name", selectors.product_name.as_deref())?,
            description: css_opt("selectors.description", selectors.description.as_deref())?,
            spec_rows: css("selectors.spec_rows", &selectors.spec_rows)?,
            price: css_opt("selectors.price", selectors.price.as_deref())?,
            pdf_links: css("selectors.pdf_links", &selectors.pdf_links)?,
        })
    }
}

fn css(field: &str, source: &str) -> Result<Selector> {
    Selector::parse(source)
        .map_err(|e| ProdScoutError::config(format!("invalid `{field}` selector {source:?}: {e}")))
}

fn css_opt(field: &str, source: Option<&str>) -> Result<Option<Selector>> {
    source.map(|s| css(field, s)).transpose()
}

/// Whitespace-collapsed text content of an element.
fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(doc: &Html, selector: Option<&Selector>) -> Option<String> {
    let text = element_text(doc.select(selector?).next()?);
    (!text.is_empty()).then_some(text)
}

/// Name + link pairs from a rendered listing page, deduplicated by URL.
pub fn extract_listing(html: &str, base: &Url, selectors: &CompiledSelectors) -> Vec<ListingEntry> {
    let doc = Html::parse_document(html);
    let mut entries: Vec<ListingEntry> = Vec::new();

    for link in doc.select(&selectors.product_link) {
        let Some(url) = link.value().attr("href").and_then(|href| resolve_url(base, href)) else {
            continue;
        };
        if entries.iter().any(|e| e.url == url) {
            continue;
        }

        let name = selectors
            .product_name
            .as_ref()
            .and_then(|sel| link.select(sel).next())
            .map(element_text)
            .filter(|n| !n.is_empty())
            .or_else(|| Some(element_text(link)).filter(|n| !n.is_empty()))
            .or_else(|| Url::parse(&url).ok().and_then(|u| slug_name(&u)));

        if let Some(name) = name {
            entries.push(ListingEntry { name, url });
        }
    }
    entries
}

/// Product record from a rendered detail page.
///
/// Specification rows are taken only when they hold exactly two cells.
pub fn extract_detail(
    html: &str,
    page_url: &Url,
    name: &str,
    selectors: &CompiledSelectors,
) -> Option<ScrapedProduct> {
    let mut product = ScrapedProduct::named(name)?;
    let doc = Html::parse_document(html);

    product.description = first_text(&doc, selectors.description.as_ref());
    product.price_text = first_text(&doc, selectors.price.as_ref());

    for row in doc.select(&selectors.spec_rows) {
        let cells: Vec<String> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "th" | "td"))
            .map(element_text)
            .collect();
        if let [key, value] = cells.as_slice()
            && !key.is_empty()
            && !value.is_empty()
        {
            product.specifications.insert(key.trim_end_matches(':'), value.as_str());
        }
    }

    for link in doc.select(&selectors.pdf_links) {
        if let Some(abs) = link.value().attr("href").and_then(|href| resolve_url(page_url, href)) {
            product.push_pdf(abs);
        }
    }

    product.source_url = Some(page_url.to_string());
    Some(product)
}

/// Heading-delimited sections of a regulation document, in document order.
///
/// Each heading matching `heading` owns the text of its following siblings up
/// to the next matching heading. Headings with no text are skipped.
pub fn extract_sections(html: &str, heading: &Selector, ref_pattern: &Pattern) -> Vec<ScrapedSection> {
    let doc = Html::parse_document(html);
    let mut sections = Vec::new();

    for head in doc.select(heading) {
        let mut parts: Vec<String> = Vec::new();
        for node in head.next_siblings() {
            if let Some(el) = ElementRef::wrap(node) {
                if heading.matches(&el) {
                    break;
                }
                if SKIPPED_ELEMENTS.contains(&el.value().name()) {
                    continue;
                }
                parts.push(element_text(el));
            } else if let Some(text) = node.value().as_text() {
                parts.push(collapse_whitespace(text));
            }
        }

        let section_text = collapse_whitespace(&parts.join(" "));
        if section_text.is_empty() {
            continue;
        }

        let heading_text = element_text(head);
        let section_ref = ref_pattern.first(&heading_text);
        let title = match &section_ref {
            Some(code) => heading_text
                .strip_prefix(code.as_str())
                .unwrap_or(&heading_text)
                .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ':' | '-'))
                .to_string(),
            None => heading_text,
        };

        sections.push(ScrapedSection {
            section_ref,
            section_title: (!title.is_empty()).then_some(title),
            section_text,
            page_number: None,
        });
    }
    sections
}

// ---------------------------------------------------------------------------
// Chromium session
// ---------------------------------------------------------------------------

/// One launched browser plus its event-loop task.
struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
    timeout: Duration,
    wait: Duration,
}

async fn bounded<T, E: Display>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ProdScoutError::Browser(format!("{what}: {e}"))),
        Err(_) => Err(ProdScoutError::Browser(format!("{what}: timed out"))),
    }
}

impl Session {
    async fn launch(timeout: Duration, wait: Duration) -> Result<Self> {
        let launch = LaunchConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={USER_AGENT}"))
            .request_timeout(timeout)
            .build()
            .map_err(|e| ProdScoutError::Browser(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(launch)
            .await
            .map_err(|e| ProdScoutError::Browser(format!("launch failed: {e}")))?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        debug!("browser launched");
        Ok(Self {
            browser,
            handler,
            timeout,
            wait,
        })
    }

    async fn open(&self, url: &str) -> Result<Page> {
        let page = bounded(self.timeout, "open page", self.browser.new_page(url)).await?;
        self.settle(&page).await;
        Ok(page)
    }

    async fn goto(&self, page: &Page, url: &str) -> Result<()> {
        bounded(self.timeout, "navigate", page.goto(url)).await?;
        self.settle(page).await;
        Ok(())
    }

    /// Best-effort wait for navigation, then the configured settle time.
    async fn settle(&self, page: &Page) {
        let _ = tokio::time::timeout(NAVIGATION_TIMEOUT, page.wait_for_navigation()).await;
        if !self.wait.is_zero() {
            tokio::time::sleep(self.wait).await;
        }
    }

    async fn html(&self, page: &Page) -> Result<String> {
        bounded(self.timeout, "read content", page.content()).await
    }

    async fn click_next(&self, page: &Page, selector: &str) -> Result<()> {
        let next = bounded(self.timeout, "find next", page.find_element(selector)).await?;
        bounded(self.timeout, "click next", next.click()).await?;
        self.settle(page).await;
        Ok(())
    }

    async fn close(mut self, page: Option<Page>) {
        if let Some(page) = page
            && let Err(e) = page.close().await
        {
            debug!(error = %e, "page close error");
        }
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser close error");
        }
        self.handler.abort();
    }
}

// ---------------------------------------------------------------------------
// Product listing/detail flow
// ---------------------------------------------------------------------------

/// Browser-driven scraper for a `browser` job.
pub struct BrowserScraper {
    config: BrowserConfig,
    selectors: CompiledSelectors,
}

impl BrowserScraper {
    pub fn new(config: BrowserConfig) -> Result<Self> {
        let selectors = CompiledSelectors::compile(&config.selectors)?;
        Ok(Self { config, selectors })
    }

    /// Run the job. A browser failure ends the run with what was collected.
    #[instrument(skip_all, fields(listing = %self.config.listing_url))]
    pub async fn scrape(&self, deadline: &Deadline, progress: &ProgressSink) -> Vec<ScrapedProduct> {
        let mut products = Vec::new();
        let timeout = Duration::from_secs(self.config.request.timeout_secs);
        let session = match Session::launch(timeout, self.config.wait).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "browser unavailable");
                return products;
            }
        };

        let page = match session.open(self.config.listing_url.as_str()).await {
            Ok(page) => Some(page),
            Err(e) => {
                warn!(error = %e, "listing page failed");
                None
            }
        };
        if let Some(page) = &page {
            let entries = self.collect_listing(&session, page, deadline, progress).await;
            self.visit_details(&session, page, entries, deadline, progress, &mut products)
                .await;
        }
        session.close(page).await;

        info!(products = products.len(), "browser scrape finished");
        products
    }

    async fn collect_listing(
        &self,
        session: &Session,
        page: &Page,
        deadline: &Deadline,
        progress: &ProgressSink,
    ) -> Vec<ListingEntry> {
        let mut entries: Vec<ListingEntry> = Vec::new();
        let max_pages = self.config.pagination.as_ref().map_or(1, |p| p.max_pages.max(1));

        for page_no in 1..=max_pages {
            if deadline.is_expired() {
                warn!(page_no, "time budget exhausted during listing");
                break;
            }
            let html = match session.html(page).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(page_no, error = %e, "listing content unavailable");
                    break;
                }
            };
            for entry in extract_listing(&html, &self.config.listing_url, &self.selectors) {
                if !entries.iter().any(|e| e.url == entry.url) {
                    entries.push(entry);
                }
            }
            progress.counts(STAGE_LISTING, page_no as usize, max_pages as usize, entries.len());

            let Some(pagination) = &self.config.pagination else {
                break;
            };
            if page_no == max_pages {
                break;
            }
            if let Err(e) = session.click_next(page, &pagination.next_selector).await {
                debug!(page_no, error = %e, "no further listing page");
                break;
            }
        }

        if let Some(max) = self.config.max_products {
            entries.truncate(max);
        }
        info!(entries = entries.len(), "listing collected");
        entries
    }

    async fn visit_details(
        &self,
        session: &Session,
        page: &Page,
        entries: Vec<ListingEntry>,
        deadline: &Deadline,
        progress: &ProgressSink,
        products: &mut Vec<ScrapedProduct>,
    ) {
        let total = entries.len();
        for (index, entry) in entries.into_iter().enumerate() {
            if deadline.is_expired() {
                warn!(visited = index, skipped = total - index, "time budget exhausted, returning partial results");
                break;
            }
            if index > 0 && !self.config.request.delay.is_zero() {
                tokio::time::sleep(self.config.request.delay).await;
            }

            let Ok(page_url) = Url::parse(&entry.url) else {
                continue;
            };
            let html = match session.goto(page, &entry.url).await {
                Ok(()) => session.html(page).await,
                Err(e) => Err(e),
            };
            match html {
                Ok(html) => match extract_detail(&html, &page_url, &entry.name, &self.selectors) {
                    Some(product) => products.push(product),
                    None => debug!(url = %entry.url, "no product extracted"),
                },
                Err(e) => warn!(url = %entry.url, error = %e, "detail page failed"),
            }
            progress.counts(STAGE_DETAIL, index + 1, total, products.len());
        }
    }
}

// ---------------------------------------------------------------------------
// Regulation flow
// ---------------------------------------------------------------------------

/// Browser-driven section extractor for a `regulation` job.
pub struct RegulationScraper {
    config: RegulationConfig,
    heading: Selector,
    ref_pattern: Pattern,
}

impl RegulationScraper {
    pub fn new(config: RegulationConfig) -> Result<Self> {
        let heading = css("section_selector", &config.section_selector)?;
        let ref_pattern = match &config.ref_pattern {
            Some(pattern) => pattern.clone(),
            None => Pattern::compile("ref_pattern", DEFAULT_REF_PATTERN)?,
        };
        Ok(Self {
            config,
            heading,
            ref_pattern,
        })
    }

    /// Render the document and split it into sections.
    #[instrument(skip_all, fields(url = %self.config.url))]
    pub async fn scrape(&self, deadline: &Deadline, progress: &ProgressSink) -> Vec<ScrapedSection> {
        if deadline.is_expired() {
            warn!("time budget exhausted before rendering");
            return Vec::new();
        }
        progress.phase(STAGE_SECTIONS, format!("rendering {}", self.config.url));

        let timeout = Duration::from_secs(self.config.request.timeout_secs);
        let session = match Session::launch(timeout, self.config.wait).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "browser unavailable");
                return Vec::new();
            }
        };

        let (page, html) = match session.open(self.config.url.as_str()).await {
            Ok(page) => {
                let html = session.html(&page).await;
                (Some(page), html)
            }
            Err(e) => (None, Err(e)),
        };
        session.close(page).await;

        let sections = match html {
            Ok(html) => extract_sections(&html, &self.heading, &self.ref_pattern),
            Err(e) => {
                warn!(error = %e, "document unavailable");
                Vec::new()
            }
        };
        progress.counts(STAGE_SECTIONS, 1, 1, sections.len());
        info!(sections = sections.len(), "regulation scrape finished");
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors(product_name: Option<&str>) -> CompiledSelectors {
        CompiledSelectors::compile(&BrowserSelectors {
            product_link: "a.product".into(),
            product_name: product_name.map(str::to_string),
            description: Some(".desc".into()),
            spec_rows: "table tr".into(),
            price: Some(".price".into()),
            pdf_links: r#"a[href$=".pdf"]"#.into(),
        })
        .unwrap()
    }

    fn base() -> Url {
        Url::parse("https://a.test/range/").unwrap()
    }

    #[test]
    fn listing_pairs_names_and_links() {
        let html = r#"
            <a class="product" href="seal-10"><span class="n">Seal 10</span> <em>new</em></a>
            <a class="product" href="/range/seal-10">duplicate</a>
            <a class="product" href="https://a.test/range/fire-collar"></a>
            <a class="other" href="/about">About</a>"#;

        let with_name = extract_listing(html, &base(), &selectors(Some(".n")));
        assert_eq!(
            with_name,
            vec![
                ListingEntry {
                    name: "Seal 10".into(),
                    url: "https://a.test/range/seal-10".into()
                },
                ListingEntry {
                    name: "Fire Collar".into(),
                    url: "https://a.test/range/fire-collar".into()
                },
            ]
        );

        let link_text = extract_listing(html, &base(), &selectors(None));
        assert_eq!(link_text[0].name, "Seal 10 new");
    }

    #[test]
    fn detail_takes_two_cell_rows_only() {
        let html = r#"<html><body>
            <div class="desc"> Intumescent   wrap </div>
            <p class="price">£12.00</p>
            <table>
              <tr><th>Size:</th><td>110mm</td></tr>
              <tr><td>Rating</td><td>EI 120</td><td>extra</td></tr>
              <tr><td colspan="2">Heading row</td></tr>
              <tr><td>Finish</td><td>Graphite</td></tr>
            </table>
            <a href="docs/wrap.pdf">Datasheet</a>
            <a href="/docs/wrap.pdf">Again</a>
        </body></html>"#;
        let url = Url::parse("https://a.test/range/wrap").unwrap();
        let p = extract_detail(html, &url, "Wrap", &selectors(None)).unwrap();

        assert_eq!(p.description.as_deref(), Some("Intumescent wrap"));
        assert_eq!(p.price_text.as_deref(), Some("£12.00"));
        assert_eq!(p.specifications.len(), 2);
        assert_eq!(p.specifications.get("Size"), Some("110mm"));
        assert_eq!(p.specifications.get("Finish"), Some("Graphite"));
        assert_eq!(p.pdf_urls, vec!["https://a.test/range/docs/wrap.pdf", "https://a.test/docs/wrap.pdf"]);
        assert_eq!(p.source_url.as_deref(), Some("https://a.test/range/wrap"));
    }

    #[test]
    fn blank_name_is_no_product() {
        let url = Url::parse("https://a.test/x").unwrap();
        assert!(extract_detail("<p>x</p>", &url, "  ", &selectors(None)).is_none());
    }

    #[test]
    fn sections_split_on_headings() {
        let html = r#"<main>
            <h1>Approved Document B</h1>
            <h2>B1 Means of warning and escape</h2>
            <p>Provide appropriate means of escape.</p>
            <ul><li>Alarms</li><li>Routes</li></ul>
            <h2>2.3 Doors</h2>
            <script>track()</script>
            <p>Fire doors should be self-closing.</p>
            <h2>Empty heading</h2>
            <h2>Annex</h2>
            loose text
        </main>"#;
        let heading = Selector::parse("h2").unwrap();
        let refs = Pattern::compile("ref_pattern", DEFAULT_REF_PATTERN).unwrap();
        let sections = extract_sections(html, &heading, &refs);

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].section_ref.as_deref(), Some("B1"));
        assert_eq!(sections[0].section_title.as_deref(), Some("Means of warning and escape"));
        assert_eq!(sections[0].section_text, "Provide appropriate means of escape. Alarms Routes");
        assert_eq!(sections[1].section_ref.as_deref(), Some("2.3"));
        assert_eq!(sections[1].section_title.as_deref(), Some("Doors"));
        assert_eq!(sections[1].section_text, "Fire doors should be self-closing.");
        assert_eq!(sections[2].section_ref, None);
        assert_eq!(sections[2].section_title.as_deref(), Some("Annex"));
        assert_eq!(sections[2].section_text, "loose text");
    }

    #[test]
    fn bad_selector_is_config_error() {
        let err = CompiledSelectors::compile(&BrowserSelectors {
            product_link: "a[".into(),
            product_name: None,
            description: None,
            spec_rows: "tr".into(),
            price: None,
            pdf_links: "a".into(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("product_link"));
    }
}
