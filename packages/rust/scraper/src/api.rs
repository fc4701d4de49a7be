//! Structured API mode: one request, a dot-path to the results array, and
//! per-field paths into each item.

use reqwest::Method;
use serde_json::Value;
use tracing::{info, instrument, warn};

use prodscout_sanitize::strip_tags;
use prodscout_shared::urls::resolve_url;
use prodscout_shared::{ApiConfig, HttpFetcher, HttpMethod, ScrapedProduct};

/// Follow a dot-separated path (`data.items`, `results.0.products`) into a
/// JSON value. An empty path is the value itself.
pub fn navigate_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|seg| !seg.is_empty())
        .try_fold(value, |current, seg| match current {
            Value::Object(map) => map.get(seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn field_text(item: &Value, path: Option<&str>) -> Option<String> {
    let text = match navigate_path(item, path?)? {
        Value::String(s) => strip_tags(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn field_list(item: &Value, path: Option<&str>) -> Vec<String> {
    let Some(value) = path.and_then(|p| navigate_path(item, p)) else {
        return Vec::new();
    };
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Object(o) => o
                    .get("url")
                    .or_else(|| o.get("src"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Map one result item to a product. Items without a name are skipped.
pub fn map_item(item: &Value, config: &ApiConfig) -> Option<ScrapedProduct> {
    let fields = &config.fields;
    let mut product = ScrapedProduct::named(field_text(item, Some(&fields.name))?)?;
    let base = &config.endpoint;

    product.product_code = field_text(item, fields.code.as_deref());
    product.description = field_text(item, fields.description.as_deref());
    product.price_text = field_text(item, fields.price.as_deref());
    product.source_url =
        field_text(item, fields.url.as_deref()).and_then(|u| resolve_url(base, &u));

    for href in field_list(item, fields.pdf.as_deref()) {
        if let Some(abs) = resolve_url(base, &href) {
            product.push_pdf(abs);
        }
    }
    for src in field_list(item, fields.image.as_deref()) {
        if let Some(abs) = resolve_url(base, &src) {
            product.push_image(abs);
        }
    }
    Some(product)
}

/// Run the configured request and map its results.
///
/// A failed request or a missing results array yields no products.
#[instrument(skip_all, fields(endpoint = %config.endpoint))]
pub async fn scrape_api(fetcher: &HttpFetcher, config: &ApiConfig) -> Vec<ScrapedProduct> {
    let method = match config.method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
    };

    let response = match fetcher
        .request_json(method, config.endpoint.as_str(), config.body.as_ref())
        .await
    {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "API request failed");
            return Vec::new();
        }
    };

    let Some(Value::Array(items)) = navigate_path(&response, &config.results_path) else {
        warn!(path = %config.results_path, "results path did not resolve to an array");
        return Vec::new();
    };

    let products: Vec<ScrapedProduct> = items
        .iter()
        .filter_map(|item| map_item(item, config))
        .collect();
    info!(items = items.len(), products = products.len(), "API results mapped");
    products
}
