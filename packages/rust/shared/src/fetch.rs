//! HTTP fetching with a fixed descriptive user agent and per-request timeout.
//!
//! Every network call in the pipeline goes through [`HttpFetcher`]. Callers
//! that treat failures as "no data" use [`HttpFetcher::fetch_optional`], which
//! logs and swallows the error at the request boundary.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::debug;

use crate::error::{ProdScoutError, Result};

/// User-Agent string for all outbound requests.
pub const USER_AGENT: &str = concat!(
    "prodscout/",
    env!("CARGO_PKG_VERSION"),
    " (+product-catalog-discovery)"
);

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Maximum response size we accept (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Configuration for an [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            headers: BTreeMap::new(),
        }
    }
}

/// Thin wrapper around a configured `reqwest::Client`. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher with appropriate settings.
    pub fn new(opts: &FetchOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &opts.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProdScoutError::config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ProdScoutError::config(format!("invalid header value for {name}: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(opts.timeout_secs.max(1)))
            .build()
            .map_err(|e| ProdScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// GET a URL and return its body. Non-2xx is an error.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProdScoutError::Network(format!("{url}: {e}")))?;
        read_body(url, response).await
    }

    /// GET a URL, logging and swallowing any failure.
    pub async fn fetch_optional(&self, url: &str) -> Option<String> {
        match self.get_text(url).await {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(%url, error = %e, "fetch failed, treating as no data");
                None
            }
        }
    }

    /// GET a URL and parse the body as JSON.
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body)
            .map_err(|e| ProdScoutError::parse(format!("{url}: invalid JSON: {e}")))
    }

    /// Issue a request with an optional JSON body and parse the JSON response.
    pub async fn request_json(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProdScoutError::Network(format!("{url}: {e}")))?;
        let text = read_body(url, response).await?;
        serde_json::from_str(&text)
            .map_err(|e| ProdScoutError::parse(format!("{url}: invalid JSON: {e}")))
    }
}

/// Check status and size, then read the body as text.
async fn read_body(url: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(ProdScoutError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(ProdScoutError::validation(format!(
                "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    response
        .text()
        .await
        .map_err(|e| ProdScoutError::Network(format!("{url}: failed to read body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_user_agent_and_custom_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", USER_AGENT))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut opts = FetchOptions::default();
        opts.headers.insert("x-api-key".into(), "secret".into());
        let fetcher = HttpFetcher::new(&opts).unwrap();

        let body = fetcher.get_text(&format!("{}/page", server.uri())).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn non_success_is_swallowed_by_fetch_optional() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&FetchOptions::default()).unwrap();
        let url = format!("{}/missing", server.uri());
        assert!(fetcher.get_text(&url).await.is_err());
        assert!(fetcher.fetch_optional(&url).await.is_none());
    }

    #[test]
    fn invalid_header_is_config_error() {
        let mut opts = FetchOptions::default();
        opts.headers.insert("bad header".into(), "x".into());
        let err = HttpFetcher::new(&opts).unwrap_err();
        assert!(matches!(err, ProdScoutError::Config { .. }));
    }
}
