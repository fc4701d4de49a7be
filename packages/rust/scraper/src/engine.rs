//! Declarative, pattern-driven scraper.
//!
//! A [`GenericScraper`] fetches the configured listing pages (plus any
//! templated pagination), then produces products with the configured
//! extraction method. Detail pages are fetched in deadline-checked batches.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use prodscout_shared::{
    Deadline, ExtractionMethod, GenericConfig, HttpFetcher, Pattern, ProgressSink, Result,
    ScrapedProduct, dedup_urls,
};

use crate::api::scrape_api;
use crate::batch::{BatchPlan, run_batches};
use crate::identity::product_from_url;
use crate::patterns::{extract_links, html_product, json_ld_product, listing_products};

const STAGE_LISTING: &str = "listing";
const STAGE_DETAIL: &str = "detail";

/// A fetched listing page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub url: Url,
    pub html: String,
}

/// Pattern-driven scraper for one generic job.
pub struct GenericScraper {
    config: GenericConfig,
    fetcher: HttpFetcher,
}

impl GenericScraper {
    /// Build a scraper; the HTTP client carries the job's custom headers.
    pub fn new(config: GenericConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.request.fetch_options())?;
        Ok(Self { config, fetcher })
    }

    /// Run the job. Never fails; the worst case is an empty list.
    #[instrument(skip_all, fields(method = self.config.method.as_str()))]
    pub async fn scrape(&self, deadline: &Deadline, progress: &ProgressSink) -> Vec<ScrapedProduct> {
        let products = match &self.config.method {
            ExtractionMethod::Api(api) => {
                progress.phase(STAGE_DETAIL, "querying API");
                scrape_api(&self.fetcher, api).await
            }
            ExtractionMethod::ListingOnly { link, name } => {
                let pages = self.fetch_listings(deadline, progress).await;
                pages
                    .iter()
                    .flat_map(|p| listing_products(&p.html, &p.url, link, name.as_ref()))
                    .collect()
            }
            ExtractionMethod::Sitemap { link } => {
                let pages = self.fetch_listings(deadline, progress).await;
                detail_links(&pages, link)
                    .iter()
                    .filter_map(|u| Url::parse(u).ok())
                    .filter_map(|u| product_from_url(&u))
                    .collect()
            }
            ExtractionMethod::JsonLd {
                link,
                schema_type,
                pdf,
            } => {
                let pages = self.fetch_listings(deadline, progress).await;
                let urls = detail_links(&pages, link);
                let schema_type: Arc<str> = Arc::from(schema_type.as_str());
                let pdf = Arc::new(pdf.clone());
                self.fetch_details(urls, deadline, progress, move |html, url| {
                    json_ld_product(html, url, &schema_type, &pdf)
                })
                .await
            }
            ExtractionMethod::Html(patterns) => {
                let pages = self.fetch_listings(deadline, progress).await;
                let urls = detail_links(&pages, &patterns.link);
                let patterns = Arc::new(patterns.clone());
                self.fetch_details(urls, deadline, progress, move |html, url| {
                    html_product(html, url, &patterns)
                })
                .await
            }
        };

        info!(
            products = products.len(),
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "generic scrape finished"
        );
        products
    }

    /// Fetch every listing URL, then templated pagination pages until the
    /// first failure, the page cap, or the deadline.
    pub async fn fetch_listings(&self, deadline: &Deadline, progress: &ProgressSink) -> Vec<ListingPage> {
        let mut pages = Vec::new();

        for url in &self.config.listing_urls {
            if deadline.is_expired() {
                warn!("time budget exhausted before all listing pages were fetched");
                return pages;
            }
            progress.phase(STAGE_LISTING, format!("fetching {url}"));
            if let Some(html) = self.fetcher.fetch_optional(url.as_str()).await {
                pages.push(ListingPage {
                    url: url.clone(),
                    html,
                });
            }
        }

        if let Some(pagination) = &self.config.pagination {
            for page in pagination.start_page..=pagination.max_pages {
                if deadline.is_expired() {
                    warn!(page, "time budget exhausted during pagination");
                    break;
                }
                let Ok(url) = Url::parse(&pagination.page_url(page)) else {
                    break;
                };
                let Some(html) = self.fetcher.fetch_optional(url.as_str()).await else {
                    debug!(page, "pagination stopped at failed page");
                    break;
                };
                progress.phase(STAGE_LISTING, format!("fetched pagination page {page}"));
                pages.push(ListingPage { url, html });
            }
        }

        info!(pages = pages.len(), "listing pages fetched");
        pages
    }

    /// Fetch detail pages in batches and apply `extract` to each.
    async fn fetch_details<F>(
        &self,
        urls: Vec<String>,
        deadline: &Deadline,
        progress: &ProgressSink,
        extract: F,
    ) -> Vec<ScrapedProduct>
    where
        F: Fn(&str, &Url) -> Option<ScrapedProduct> + Send + Sync + 'static,
    {
        progress.phase(STAGE_DETAIL, format!("fetching {} detail pages", urls.len()));
        let plan = BatchPlan::new(&self.config.request, deadline, progress, STAGE_DETAIL);
        let extract = Arc::new(extract);

        run_batches(urls, &plan, |url| {
            let fetcher = self.fetcher.clone();
            let extract = extract.clone();
            async move {
                let page_url = Url::parse(&url).ok()?;
                let html = fetcher.fetch_optional(&url).await?;
                let product = extract(&html, &page_url);
                if product.is_none() {
                    debug!(%url, "no product extracted");
                }
                product
            }
        })
        .await
    }
}

/// Detail URLs from every listing page, deduplicated in order.
fn detail_links(pages: &[ListingPage], link: &Pattern) -> Vec<String> {
    dedup_urls(
        pages.iter().flat_map(|p| extract_links(&p.html, &p.url, link)),
        usize::MAX,
    )
}
