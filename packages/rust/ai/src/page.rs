//! Page classification and product extraction prompts.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use prodscout_sanitize::sanitize_html;
use prodscout_shared::urls::resolve_url;
use prodscout_shared::{ScrapedProduct, collapse_whitespace};

use crate::ContentModel;
use crate::json::{confidence, json_object_span, string_list, text};

const SYSTEM_PROMPT: &str = "You analyse manufacturer websites to build product catalogues. \
Answer with a single JSON object and nothing else. Never invent values: \
use null or empty lists for anything the page does not state.";

/// Caller-supplied context embedded in every prompt.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub manufacturer: String,
    pub goal: String,
}

/// What kind of page the service judged this to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    ProductListing,
    ProductDetail,
    Navigation,
    #[default]
    Other,
}

impl PageType {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("product_listing") => Self::ProductListing,
            Some("product_detail") => Self::ProductDetail,
            Some("navigation") => Self::Navigation,
            _ => Self::Other,
        }
    }
}

/// Result of [`classify_page`]. The default value is the "nothing found"
/// answer returned on any failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageClassification {
    pub page_type: PageType,
    /// Absolute product detail URLs.
    pub product_urls: Vec<String>,
    pub next_page_url: Option<String>,
    pub catalogue_url: Option<String>,
    /// 0..=100
    pub confidence: u8,
}

/// Result of [`extract_product`]. `product` is `None` when the page is not
/// a product or nothing usable came back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductExtraction {
    pub product: Option<ScrapedProduct>,
    pub confidence: u8,
}

/// Classify a page and collect the product links on it.
#[instrument(skip_all, fields(url = %page_url))]
pub async fn classify_page<M: ContentModel>(
    model: &M,
    page_url: &Url,
    html: &str,
    ctx: &PromptContext,
) -> PageClassification {
    let prompt = format!(
        "Page URL: {page_url}\n\
         Manufacturer: {manufacturer}\n\
         Goal: {goal}\n\n\
         Classify this page and list the links to individual product detail pages on it.\n\
         Respond with JSON of the form:\n\
         {{\"page_type\": \"product_listing\" | \"product_detail\" | \"navigation\" | \"other\",\n  \
           \"product_urls\": [string],\n  \
           \"next_page_url\": string | null,\n  \
           \"catalogue_url\": string | null,\n  \
           \"confidence\": integer 0-100}}\n\
         catalogue_url is the link to the main product catalogue when this page is navigation.\n\n\
         HTML:\n{html}",
        manufacturer = ctx.manufacturer,
        goal = ctx.goal,
        html = sanitize_html(html, None),
    );

    let Some(value) = ask(model, &prompt).await else {
        return PageClassification::default();
    };

    let resolve = |v: Option<&Value>| text(v).and_then(|href| resolve_url(page_url, &href));
    let mut product_urls: Vec<String> = Vec::new();
    for href in string_list(value.get("product_urls")) {
        if let Some(abs) = resolve_url(page_url, &href) {
            if !product_urls.contains(&abs) {
                product_urls.push(abs);
            }
        }
    }

    let classification = PageClassification {
        page_type: PageType::parse(value.get("page_type").and_then(Value::as_str)),
        product_urls,
        next_page_url: resolve(value.get("next_page_url")),
        catalogue_url: resolve(value.get("catalogue_url")),
        confidence: confidence(value.get("confidence")),
    };
    debug!(
        page_type = ?classification.page_type,
        products = classification.product_urls.len(),
        "page classified"
    );
    classification
}

/// Extract one product record from a detail page.
#[instrument(skip_all, fields(url = %page_url))]
pub async fn extract_product<M: ContentModel>(
    model: &M,
    page_url: &Url,
    html: &str,
    ctx: &PromptContext,
) -> ProductExtraction {
    let prompt = format!(
        "Page URL: {page_url}\n\
         Manufacturer: {manufacturer}\n\
         Goal: {goal}\n\n\
         If this page describes a single product, extract it. Copy values exactly as written.\n\
         Respond with JSON of the form:\n\
         {{\"is_product\": boolean,\n  \
           \"product_name\": string | null,\n  \
           \"product_code\": string | null,\n  \
           \"description\": string | null,\n  \
           \"specifications\": {{string: string}},\n  \
           \"price_text\": string | null,\n  \
           \"pdf_urls\": [string],\n  \
           \"image_urls\": [string],\n  \
           \"confidence\": integer 0-100}}\n\n\
         HTML:\n{html}",
        manufacturer = ctx.manufacturer,
        goal = ctx.goal,
        html = sanitize_html(html, None),
    );

    let Some(value) = ask(model, &prompt).await else {
        return ProductExtraction::default();
    };

    let confidence = confidence(value.get("confidence"));
    if value.get("is_product").and_then(Value::as_bool) == Some(false) {
        return ProductExtraction {
            product: None,
            confidence,
        };
    }

    let Some(mut product) = text(value.get("product_name")).and_then(ScrapedProduct::named) else {
        return ProductExtraction {
            product: None,
            confidence,
        };
    };

    product.product_code = text(value.get("product_code"));
    product.description = text(value.get("description")).map(|d| collapse_whitespace(&d));
    product.price_text = text(value.get("price_text"));
    if let Some(Value::Object(specs)) = value.get("specifications") {
        for (key, val) in specs {
            if let Some(val) = text(Some(val)) {
                product.specifications.insert(key.trim(), val);
            }
        }
    }
    for href in string_list(value.get("pdf_urls")) {
        if let Some(abs) = resolve_url(page_url, &href) {
            product.push_pdf(abs);
        }
    }
    for href in string_list(value.get("image_urls")) {
        if let Some(abs) = resolve_url(page_url, &href) {
            product.push_image(abs);
        }
    }
    product.source_url = Some(page_url.to_string());

    ProductExtraction {
        product: Some(product),
        confidence,
    }
}

/// Run one completion and recover a JSON object from the reply.
async fn ask<M: ContentModel>(model: &M, prompt: &str) -> Option<serde_json::Map<String, Value>> {
    let reply = match model.complete(SYSTEM_PROMPT, prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "content service call failed");
            return None;
        }
    };

    let Some(span) = json_object_span(&reply) else {
        warn!(reply_chars = reply.len(), "no JSON object in service reply");
        return None;
    };

    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!("service reply was not a JSON object");
            None
        }
        Err(e) => {
            warn!(error = %e, "malformed JSON in service reply");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prodscout_shared::{ProdScoutError, Result};

    struct CannedModel(std::result::Result<&'static str, &'static str>);

    impl ContentModel for CannedModel {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            assert!(user.contains("Manufacturer: Acme"));
            self.0
                .map(str::to_string)
                .map_err(|e| ProdScoutError::Service(e.to_string()))
        }
    }

    fn ctx() -> PromptContext {
        PromptContext {
            manufacturer: "Acme".into(),
            goal: "find fire seals".into(),
        }
    }

    fn page() -> Url {
        Url::parse("https://acme.example/range/seals/").unwrap()
    }

    #[tokio::test]
    async fn classify_resolves_links_and_clamps() {
        let model = CannedModel(Ok(r#"```json
{"page_type": "product_listing",
 "product_urls": ["/products/a", "b", "/products/a", "mailto:x@y"],
 "next_page_url": "?page=2",
 "catalogue_url": null,
 "confidence": 140}
```"#));
        let c = classify_page(&model, &page(), "<p>x</p>", &ctx()).await;
        assert_eq!(c.page_type, PageType::ProductListing);
        assert_eq!(
            c.product_urls,
            vec![
                "https://acme.example/products/a",
                "https://acme.example/range/seals/b"
            ]
        );
        assert_eq!(
            c.next_page_url.as_deref(),
            Some("https://acme.example/range/seals/?page=2")
        );
        assert_eq!(c.catalogue_url, None);
        assert_eq!(c.confidence, 100);
    }

    #[tokio::test]
    async fn classify_unknown_type_keeps_links() {
        let model = CannedModel(Ok(r#"Sure! {"page_type": "blog", "product_urls": ["/p/1"]}"#));
        let c = classify_page(&model, &page(), "", &ctx()).await;
        assert_eq!(c.page_type, PageType::Other);
        assert_eq!(c.product_urls.len(), 1);
    }

    #[tokio::test]
    async fn classify_degrades_on_garbage_and_errors() {
        let garbage = CannedModel(Ok("I could not read the page"));
        assert_eq!(
            classify_page(&garbage, &page(), "", &ctx()).await,
            PageClassification::default()
        );

        let failing = CannedModel(Err("timeout"));
        assert_eq!(
            classify_page(&failing, &page(), "", &ctx()).await,
            PageClassification::default()
        );
    }

    #[tokio::test]
    async fn extract_builds_product() {
        let model = CannedModel(Ok(r#"{
            "is_product": true,
            "product_name": "  Intumescent   Seal ",
            "product_code": "IS-20",
            "description": "Expands\nunder heat.",
            "specifications": {"Width": "20mm", "Rating": 60, "Colour": null},
            "price_text": null,
            "pdf_urls": ["../../docs/is20.pdf"],
            "image_urls": ["https://cdn.example/is20.jpg"],
            "confidence": "88"
        }"#));
        let out = extract_product(&model, &page(), "<h1>x</h1>", &ctx()).await;
        let p = out.product.expect("product");
        assert_eq!(p.product_name, "Intumescent Seal");
        assert_eq!(p.product_code.as_deref(), Some("IS-20"));
        assert_eq!(p.description.as_deref(), Some("Expands under heat."));
        assert_eq!(p.specifications.get("Width"), Some("20mm"));
        assert_eq!(p.specifications.get("Rating"), Some("60"));
        assert!(!p.specifications.contains_key("Colour"));
        assert_eq!(p.pdf_urls, vec!["https://acme.example/docs/is20.pdf"]);
        assert_eq!(p.image_urls, Some(vec!["https://cdn.example/is20.jpg".to_string()]));
        assert_eq!(p.source_url.as_deref(), Some("https://acme.example/range/seals/"));
        assert_eq!(out.confidence, 88);
    }

    #[tokio::test]
    async fn extract_not_a_product() {
        let model = CannedModel(Ok(r#"{"is_product": false, "product_name": "About us"}"#));
        assert!(extract_product(&model, &page(), "", &ctx()).await.product.is_none());

        let nameless = CannedModel(Ok(r#"{"product_name": "", "confidence": 10}"#));
        let out = extract_product(&nameless, &page(), "", &ctx()).await;
        assert!(out.product.is_none());
        assert_eq!(out.confidence, 10);
    }
}
