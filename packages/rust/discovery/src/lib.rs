//! Product URL discovery.
//!
//! Cheapest strategy first: probe the site's sitemaps, and only when that
//! yields too few product URLs ask the content service to navigate the site
//! from its homepage (homepage → catalogue → next pages).

pub mod sitemap;

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};
use url::Url;

use prodscout_ai::{ContentModel, PageClassification, PageType, PromptContext, classify_page};
use prodscout_shared::{
    Deadline, DiscoveryMethod, DiscoveryResult, HttpFetcher, ProgressSink, dedup_urls,
};

pub use crate::sitemap::{MAX_PRODUCT_URLS, probe_sitemaps};

/// Sitemap results at or above this count skip AI navigation entirely.
pub const SITEMAP_SUFFICIENT: usize = 5;

/// Next-page hops followed from the catalogue page.
pub const MAX_PAGINATION_HOPS: usize = 20;

const STAGE: &str = "discovery";

/// Discover product detail URLs for a site.
///
/// Never fails; an unreachable site yields an empty result.
#[instrument(skip_all, fields(site = %site_url))]
pub async fn discover_products<M: ContentModel>(
    fetcher: &HttpFetcher,
    model: &M,
    site_url: &Url,
    ctx: &PromptContext,
    deadline: &Deadline,
    progress: &ProgressSink,
) -> DiscoveryResult {
    progress.phase(STAGE, "probing sitemaps");
    let sitemap_urls = probe_sitemaps(fetcher, site_url).await;

    if sitemap_urls.len() >= SITEMAP_SUFFICIENT {
        info!(count = sitemap_urls.len(), "sitemap sufficient, skipping AI navigation");
        progress.phase(STAGE, format!("found {} products in sitemaps", sitemap_urls.len()));
        return DiscoveryResult {
            product_urls: sitemap_urls,
            method: DiscoveryMethod::Sitemap,
        };
    }

    progress.phase(STAGE, "analysing homepage");
    let ai_urls = navigate(fetcher, model, site_url, ctx, deadline, progress).await;

    let method = match (sitemap_urls.is_empty(), ai_urls.is_empty()) {
        (false, false) => DiscoveryMethod::Both,
        (true, false) => DiscoveryMethod::AiNavigation,
        _ => DiscoveryMethod::Sitemap,
    };
    let product_urls = dedup_urls(sitemap_urls.into_iter().chain(ai_urls), MAX_PRODUCT_URLS);

    info!(count = product_urls.len(), %method, "discovery finished");
    progress.phase(STAGE, format!("found {} products via {method}", product_urls.len()));
    DiscoveryResult {
        product_urls,
        method,
    }
}

/// Walk homepage → catalogue → next pages, collecting product links.
async fn navigate<M: ContentModel>(
    fetcher: &HttpFetcher,
    model: &M,
    site_url: &Url,
    ctx: &PromptContext,
    deadline: &Deadline,
    progress: &ProgressSink,
) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();

    let Some(home) = classify_url(fetcher, model, site_url, ctx, &mut visited).await else {
        return found;
    };
    found.extend(home.product_urls.iter().cloned());

    let wants_catalogue = home.page_type == PageType::Navigation || home.product_urls.is_empty();
    let catalogue = home
        .catalogue_url
        .clone()
        .filter(|c| wants_catalogue && !visited.contains(c));
    let mut current = match catalogue {
        Some(catalogue) => {
            progress.phase(STAGE, "analysing catalogue page");
            let Ok(catalogue) = Url::parse(&catalogue) else {
                return found;
            };
            match classify_url(fetcher, model, &catalogue, ctx, &mut visited).await {
                Some(page) => {
                    found.extend(page.product_urls.iter().cloned());
                    page
                }
                None => return found,
            }
        }
        None => home,
    };

    for hop in 1..=MAX_PAGINATION_HOPS {
        if deadline.is_expired() {
            warn!(hop, "time budget exhausted during navigation");
            break;
        }
        let Some(next) = current.next_page_url.take() else {
            break;
        };
        if visited.contains(&next) {
            debug!(%next, "next page already visited");
            break;
        }
        let Ok(next_url) = Url::parse(&next) else {
            break;
        };
        progress.counts(STAGE, hop, MAX_PAGINATION_HOPS, found.len());
        match classify_url(fetcher, model, &next_url, ctx, &mut visited).await {
            Some(page) => {
                found.extend(page.product_urls.iter().cloned());
                current = page;
            }
            None => break,
        }
    }

    found
}

/// Fetch and classify one page. `None` when the fetch fails.
async fn classify_url<M: ContentModel>(
    fetcher: &HttpFetcher,
    model: &M,
    url: &Url,
    ctx: &PromptContext,
    visited: &mut HashSet<String>,
) -> Option<PageClassification> {
    visited.insert(url.to_string());
    let html = fetcher.fetch_optional(url.as_str()).await?;
    let page = classify_page(model, url, &html, ctx).await;
    debug!(
        %url,
        page_type = ?page.page_type,
        products = page.product_urls.len(),
        "navigated"
    );
    Some(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use prodscout_shared::{FetchOptions, Result};
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replies keyed by the page URL embedded in the prompt.
    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn reply(self, url: String, json: serde_json::Value) -> Self {
            self.replies.lock().unwrap().insert(url, json.to_string());
            self
        }
    }

    impl ContentModel for ScriptedModel {
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
                .unwrap_or_else(|| "{}".into()))
        }
    }

    fn ctx() -> PromptContext {
        PromptContext {
            manufacturer: "Acme".into(),
            goal: "all products".into(),
        }
    }

    async fn serve(server: &MockServer, at: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    fn urlset(locs: &[String]) -> String {
        let body: String = locs.iter().map(|l| format!("<url><loc>{l}</loc></url>")).collect();
        format!("<urlset>{body}</urlset>")
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetchOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn sufficient_sitemap_never_calls_model() {
        let server = MockServer::start().await;
        let base = server.uri();
        let locs: Vec<String> = (0..6).map(|i| format!("{base}/products/p{i}")).collect();
        serve(&server, "/sitemap.xml", urlset(&locs)).await;
        serve(&server, "/", "<html>home</html>".into()).await;

        let model = ScriptedModel::default();
        let site = Url::parse(&base).unwrap();
        let result = discover_products(
            &fetcher(),
            &model,
            &site,
            &ctx(),
            &Deadline::default(),
            &ProgressSink::silent(),
        )
        .await;

        assert_eq!(result.method, DiscoveryMethod::Sitemap);
        assert_eq!(result.product_urls.len(), 6);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn navigates_catalogue_and_pages_then_merges() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(&server, "/sitemap.xml", urlset(&[format!("{base}/products/s1")])).await;
        serve(&server, "/", "<html>home</html>".into()).await;
        serve(&server, "/catalogue", "<html>cat</html>".into()).await;
        serve(&server, "/catalogue/2", "<html>cat2</html>".into()).await;

        let site = Url::parse(&format!("{base}/")).unwrap();
        let model = ScriptedModel::default()
            .reply(
                format!("{base}/"),
                serde_json::json!({"page_type": "navigation", "product_urls": [], "catalogue_url": "/catalogue"}),
            )
            .reply(
                format!("{base}/catalogue"),
                serde_json::json!({"page_type": "product_listing",
                    "product_urls": ["/products/a", "/products/s1"], "next_page_url": "/catalogue/2"}),
            )
            .reply(
                format!("{base}/catalogue/2"),
                serde_json::json!({"page_type": "product_listing",
                    "product_urls": ["/products/b"], "next_page_url": "/catalogue"}),
            );

        let result = discover_products(
            &fetcher(),
            &model,
            &site,
            &ctx(),
            &Deadline::default(),
            &ProgressSink::silent(),
        )
        .await;

        assert_eq!(result.method, DiscoveryMethod::Both);
        assert_eq!(
            result.product_urls,
            vec![
                format!("{base}/products/s1"),
                format!("{base}/products/a"),
                format!("{base}/products/b"),
            ]
        );
        // home, catalogue, page 2; the loop back to /catalogue stops.
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ai_only_and_empty_results() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(&server, "/", "<html>home</html>".into()).await;

        let site = Url::parse(&format!("{base}/")).unwrap();
        let model = ScriptedModel::default().reply(
            format!("{base}/"),
            serde_json::json!({"page_type": "product_listing", "product_urls": ["/item/x"]}),
        );
        let result = discover_products(
            &fetcher(),
            &model,
            &site,
            &ctx(),
            &Deadline::default(),
            &ProgressSink::silent(),
        )
        .await;
        assert_eq!(result.method, DiscoveryMethod::AiNavigation);
        assert_eq!(result.product_urls, vec![format!("{base}/item/x")]);

        let silent = ScriptedModel::default();
        let result = discover_products(
            &fetcher(),
            &silent,
            &site,
            &ctx(),
            &Deadline::default(),
            &ProgressSink::silent(),
        )
        .await;
        assert_eq!(result.method, DiscoveryMethod::Sitemap);
        assert!(result.product_urls.is_empty());
    }

    #[tokio::test]
    async fn pagination_hops_are_capped() {
        let server = MockServer::start().await;
        let base = server.uri();
        serve(&server, "/", "<html>home</html>".into()).await;
        serve(&server, "/catalogue", "<html>cat</html>".into()).await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/list/\d+$"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>list</html>"))
            .mount(&server)
            .await;

        let mut model = ScriptedModel::default()
            .reply(
                format!("{base}/"),
                serde_json::json!({"page_type": "navigation", "catalogue_url": "/catalogue"}),
            )
            .reply(
                format!("{base}/catalogue"),
                serde_json::json!({"page_type": "product_listing",
                    "product_urls": ["/products/c"], "next_page_url": "/list/1"}),
            );
        // Every listing page points at one more.
        for i in 1..=40 {
            model = model.reply(
                format!("{base}/list/{i}"),
                serde_json::json!({"page_type": "product_listing",
                    "product_urls": [format!("/products/p{i}")],
                    "next_page_url": format!("/list/{}", i + 1)}),
            );
        }

        let site = Url::parse(&format!("{base}/")).unwrap();
        let result = discover_products(
            &fetcher(),
            &model,
            &site,
            &ctx(),
            &Deadline::default(),
            &ProgressSink::silent(),
        )
        .await;

        // home + catalogue + at most MAX_PAGINATION_HOPS next pages.
        assert_eq!(model.calls.load(Ordering::SeqCst), 2 + MAX_PAGINATION_HOPS);
        assert_eq!(result.product_urls.len(), 1 + MAX_PAGINATION_HOPS);
        assert_eq!(
            result.product_urls.last(),
            Some(&format!("{base}/products/p{MAX_PAGINATION_HOPS}"))
        );
    }
}
