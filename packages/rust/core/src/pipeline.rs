//! End-to-end job runner: job config → strategy → dedup → records.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use prodscout_ai::{ContentModel, PromptContext, extract_product};
use prodscout_discovery::discover_products;
use prodscout_scraper::{
    BatchPlan, BrowserScraper, GenericScraper, RegulationScraper, ShopifyScraper, run_batches,
};
use prodscout_shared::{
    AiConfig, Deadline, DefaultsConfig, DiscoveryResult, FetchOptions, HttpFetcher, JobConfig,
    ProdScoutError, ProgressSink, Result, ScrapedProduct, ScrapedSection, dedup_products,
};

const STAGE_EXTRACT: &str = "ai-extract";

/// What a job produced. Serializes as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScrapeOutput {
    Products(Vec<ScrapedProduct>),
    Sections(Vec<ScrapedSection>),
}

impl ScrapeOutput {
    pub fn len(&self) -> usize {
        match self {
            Self::Products(p) => p.len(),
            Self::Sections(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pretty-printed JSON array.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ProdScoutError::parse(format!("failed to serialize output: {e}")))
    }
}

/// Run one compiled job to completion.
///
/// Errors only come from setting the job up (bad selectors, an `ai` job
/// without a content model). Once running, failures degrade to fewer
/// records and the deadline bounds the whole run.
#[instrument(skip_all, fields(kind = job.kind()))]
pub async fn run_job<M: ContentModel + 'static>(
    job: &JobConfig,
    model: Option<Arc<M>>,
    progress: &ProgressSink,
) -> Result<ScrapeOutput> {
    let deadline = job.request().deadline();
    info!(budget_secs = job.request().time_budget.as_secs(), "starting job");

    let output = match job {
        JobConfig::Generic(cfg) => {
            let scraper = GenericScraper::new(cfg.clone())?;
            ScrapeOutput::Products(scraper.scrape(&deadline, progress).await)
        }
        JobConfig::Shopify(cfg) => {
            let scraper = ShopifyScraper::new(cfg.clone())?;
            ScrapeOutput::Products(scraper.scrape(&deadline, progress).await)
        }
        JobConfig::Browser(cfg) => {
            let scraper = BrowserScraper::new(cfg.clone())?;
            ScrapeOutput::Products(scraper.scrape(&deadline, progress).await)
        }
        JobConfig::Regulation(cfg) => {
            let scraper = RegulationScraper::new(cfg.clone())?;
            ScrapeOutput::Sections(scraper.scrape(&deadline, progress).await)
        }
        JobConfig::Ai(cfg) => {
            let model = model.ok_or_else(|| {
                ProdScoutError::config("`ai` jobs need a content model (is the API key set?)")
            })?;
            ScrapeOutput::Products(scrape_with_ai(cfg, model, &deadline, progress).await?)
        }
    };

    let output = match output {
        ScrapeOutput::Products(products) => {
            let before = products.len();
            let products = dedup_products(products);
            if products.len() < before {
                info!(removed = before - products.len(), "duplicate products removed");
            }
            ScrapeOutput::Products(products)
        }
        sections => sections,
    };

    info!(
        records = output.len(),
        elapsed_ms = deadline.elapsed().as_millis() as u64,
        "job finished"
    );
    Ok(output)
}

/// Discovery followed by AI extraction of every discovered product page.
pub async fn scrape_with_ai<M: ContentModel + 'static>(
    config: &AiConfig,
    model: Arc<M>,
    deadline: &Deadline,
    progress: &ProgressSink,
) -> Result<Vec<ScrapedProduct>> {
    let fetcher = HttpFetcher::new(&config.request.fetch_options())?;
    let ctx = Arc::new(PromptContext {
        manufacturer: config.manufacturer.clone(),
        goal: config.goal.clone(),
    });

    let discovery =
        discover_products(&fetcher, model.as_ref(), &config.site_url, &ctx, deadline, progress).await;
    let mut urls = discovery.product_urls;
    if urls.len() > config.max_products {
        warn!(
            discovered = urls.len(),
            limit = config.max_products,
            "more product URLs than allowed, truncating"
        );
        urls.truncate(config.max_products);
    }

    progress.phase(STAGE_EXTRACT, format!("extracting {} product pages", urls.len()));
    let plan = BatchPlan::new(&config.request, deadline, progress, STAGE_EXTRACT);
    let products = run_batches(urls, &plan, |url| {
        let fetcher = fetcher.clone();
        let model = model.clone();
        let ctx = ctx.clone();
        async move {
            let page_url = Url::parse(&url).ok()?;
            let html = fetcher.fetch_optional(&url).await?;
            let extraction = extract_product(model.as_ref(), &page_url, &html, &ctx).await;
            extraction.product
        }
    })
    .await;

    info!(products = products.len(), method = %discovery.method, "AI extraction finished");
    Ok(products)
}

/// Standalone discovery for a site, using application defaults for the
/// request timeout and time budget.
pub async fn discover_site<M: ContentModel>(
    site_url: &Url,
    ctx: &PromptContext,
    model: &M,
    defaults: &DefaultsConfig,
    progress: &ProgressSink,
) -> Result<DiscoveryResult> {
    let fetcher = HttpFetcher::new(&FetchOptions {
        timeout_secs: defaults.timeout_secs,
        ..FetchOptions::default()
    })?;
    let deadline = Deadline::after(std::time::Duration::from_secs(defaults.time_budget_secs));
    Ok(discover_products(&fetcher, model, site_url, ctx, &deadline, progress).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use prodscout_shared::JobSpec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replies keyed on the page URL embedded in the prompt.
    #[derive(Default)]
    struct FakeModel {
        replies: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
    }

    impl FakeModel {
        fn reply(self, url: String, value: serde_json::Value) -> Self {
            self.replies.lock().unwrap().insert(url, value.to_string());
            self
        }
    }

    impl ContentModel for FakeModel {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let url = user
                .lines()
                .find_map(|l| l.strip_prefix("Page URL: "))
                .unwrap_or_default();
            Ok(self
                .replies
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| "{}".to_string()))
        }
    }

    fn compile(src: &str) -> JobConfig {
        let spec: JobSpec = toml::from_str(src).expect("job toml");
        spec.compile(&DefaultsConfig::default()).expect("compile")
    }

    async fn serve(server: &MockServer, at: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn ai_job_extracts_discovered_pages() {
        let server = MockServer::start().await;
        let base = server.uri();
        let slugs = ["seal", "collar", "wrap", "pad", "board", "spare"];
        let locs: String = slugs
            .iter()
            .map(|s| format!("<url><loc>{base}/products/{s}</loc></url>"))
            .collect();
        serve(&server, "/sitemap.xml", format!("<urlset>{locs}</urlset>")).await;
        for slug in slugs {
            serve(&server, &format!("/products/{slug}"), format!("<h1>{slug}</h1>")).await;
        }

        let model = FakeModel::default()
            .reply(
                format!("{base}/products/seal"),
                json!({"is_product": true, "product_name": "Smoke Seal", "confidence": 90}),
            )
            .reply(
                format!("{base}/products/collar"),
                json!({"is_product": true, "product_name": "Pipe Collar", "confidence": 85}),
            )
            .reply(format!("{base}/products/wrap"), json!({"is_product": false}));
        let model = Arc::new(model);

        let job = compile(&format!(
            r#"
type = "ai"
site_url = "{base}/"
manufacturer = "Acme"
max_products = 4

[request]
delay_ms = 0
"#
        ));

        let output = run_job(&job, Some(model.clone()), &ProgressSink::silent())
            .await
            .unwrap();
        let ScrapeOutput::Products(products) = output else {
            panic!("expected products");
        };

        let names: Vec<&str> = products.iter().map(|p| p.product_name.as_str()).collect();
        assert_eq!(names, vec!["Smoke Seal", "Pipe Collar"]);
        assert_eq!(products[0].source_url, Some(format!("{base}/products/seal")));
        // Sitemap was sufficient, so only the four capped extractions ran.
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn ai_job_without_model_is_config_error() {
        let job = compile(
            r#"
type = "ai"
site_url = "https://acme.test/"
manufacturer = "Acme"
"#,
        );
        let err = run_job::<FakeModel>(&job, None, &ProgressSink::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, ProdScoutError::Config { .. }));
    }

    #[tokio::test]
    async fn generic_job_output_is_deduplicated() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(
            &server,
            "/range",
            r#"<h3>Seal</h3><a href="/p/seal">x</a>"#.into(),
        )
        .await;

        let job = compile(&format!(
            r#"
type = "generic"
listing_urls = ["{base}/range", "{base}/range?copy=1"]

[detail]
method = "listing-only"
link_pattern = 'href="([^"]+)"'
name_pattern = '<h3>(.*?)</h3>'
"#
        ));

        let output = run_job::<FakeModel>(&job, None, &ProgressSink::silent())
            .await
            .unwrap();
        assert_eq!(output.len(), 1);
        let json = output.to_json_pretty().unwrap();
        assert!(json.trim_start().starts_with('['));
        assert!(json.contains("\"product_name\": \"Seal\""));
    }
}
