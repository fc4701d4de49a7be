//! Extraction primitives over raw HTML: pattern-driven fields, JSON-LD
//! product blocks, and listing link/name pairing.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use prodscout_sanitize::{decode_entities, strip_tags};
use prodscout_shared::urls::{is_pdf_url, resolve_url};
use prodscout_shared::{HtmlPatterns, Pattern, ScrapedProduct};

use crate::identity::slug_name;

/// Every link-pattern match resolved to an absolute URL, deduplicated in
/// document order.
pub fn extract_links(html: &str, base: &Url, link: &Pattern) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for href in link.all(html) {
        if let Some(abs) = resolve_url(base, &decode_entities(&href)) {
            if !links.contains(&abs) {
                links.push(abs);
            }
        }
    }
    links
}

/// Clean a captured fragment into display text.
fn clean(fragment: &str) -> Option<String> {
    let text = strip_tags(fragment);
    (!text.is_empty()).then_some(text)
}

// ---------------------------------------------------------------------------
// Listing-only
// ---------------------------------------------------------------------------

/// Products straight from a listing page: the i-th name pairs with the i-th
/// link. With no name matches, names come from the link slugs.
pub fn listing_products(
    html: &str,
    base: &Url,
    link: &Pattern,
    name: Option<&Pattern>,
) -> Vec<ScrapedProduct> {
    let hrefs = link.all(html);
    let names: Vec<String> = name.map(|p| p.all(html)).unwrap_or_default();

    // Pair raw matches first so a dropped link or blank name never shifts
    // the names after it onto the wrong URL.
    let pairs: Vec<(String, String)> = if names.is_empty() {
        hrefs
            .iter()
            .filter_map(|href| {
                let url = resolve_url(base, &decode_entities(href))?;
                let name = Url::parse(&url).ok().and_then(|u| slug_name(&u))?;
                Some((name, url))
            })
            .collect()
    } else {
        names
            .iter()
            .zip(&hrefs)
            .filter_map(|(name, href)| {
                Some((clean(name)?, resolve_url(base, &decode_entities(href))?))
            })
            .collect()
    };

    pairs
        .into_iter()
        .filter_map(|(name, url)| {
            let mut product = ScrapedProduct::named(name)?;
            if is_pdf_url(&url) {
                product.push_pdf(url.clone());
            }
            product.source_url = Some(url);
            Some(product)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTML patterns
// ---------------------------------------------------------------------------

/// Apply the configured patterns to a detail page. `None` when the name
/// pattern does not match.
pub fn html_product(html: &str, page_url: &Url, patterns: &HtmlPatterns) -> Option<ScrapedProduct> {
    let name = patterns.name.first(html).and_then(|n| clean(&n))?;
    let mut product = ScrapedProduct::named(name)?;

    product.product_code = patterns
        .code
        .as_ref()
        .and_then(|p| p.first(html))
        .and_then(|c| clean(&c));
    product.description = patterns
        .description
        .as_ref()
        .and_then(|p| p.first(html))
        .and_then(|d| clean(&d));
    product.price_text = patterns
        .price
        .as_ref()
        .and_then(|p| p.first(html))
        .and_then(|d| clean(&d));

    for (key, value) in patterns.specs.pairs(html) {
        if let (Some(key), Some(value)) = (clean(&key), clean(&value)) {
            product.specifications.insert(key.trim_end_matches(':').trim(), value);
        }
    }
    for href in patterns.pdf.all(html) {
        if let Some(abs) = resolve_url(page_url, &decode_entities(&href)) {
            product.push_pdf(abs);
        }
    }
    if let Some(image) = &patterns.image {
        for src in image.all(html) {
            if let Some(abs) = resolve_url(page_url, &decode_entities(&src)) {
                product.push_image(abs);
            }
        }
    }

    product.source_url = Some(page_url.to_string());
    Some(product)
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

/// Every JSON-LD object on the page whose `@type` matches `schema_type`,
/// from top-level, array, and `@graph` forms.
pub fn json_ld_objects(html: &str, schema_type: &str) -> Vec<Value> {
    static LD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
    });

    let document = Html::parse_document(html);
    let mut found = Vec::new();
    for script in document.select(&LD_SELECTOR) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        collect_typed(value, schema_type, &mut found);
    }
    found
}

fn collect_typed(value: Value, schema_type: &str, found: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_typed(item, schema_type, found);
            }
        }
        Value::Object(mut map) => {
            if let Some(Value::Array(graph)) = map.remove("@graph") {
                for item in graph {
                    collect_typed(item, schema_type, found);
                }
            }
            let matches = match map.get("@type") {
                Some(Value::String(t)) => type_matches(t, schema_type),
                Some(Value::Array(types)) => types
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|t| type_matches(t, schema_type)),
                _ => false,
            };
            if matches {
                found.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn type_matches(declared: &str, wanted: &str) -> bool {
    let declared = declared.rsplit('/').next().unwrap_or(declared);
    declared.eq_ignore_ascii_case(wanted)
}

/// Map the first matching JSON-LD object to a product; PDF links still
/// come from the pattern over raw HTML.
pub fn json_ld_product(
    html: &str,
    page_url: &Url,
    schema_type: &str,
    pdf: &Pattern,
) -> Option<ScrapedProduct> {
    let object = json_ld_objects(html, schema_type).into_iter().next()?;
    let mut product = ScrapedProduct::named(ld_text(object.get("name"))?)?;

    product.product_code = ld_text(object.get("sku")).or_else(|| ld_text(object.get("mpn")));
    product.description = ld_text(object.get("description")).and_then(|d| clean(&d));

    let brand = match object.get("brand") {
        Some(Value::Object(b)) => ld_text(b.get("name")),
        other => ld_text(other),
    };
    if let Some(brand) = brand {
        product.specifications.insert("Brand", brand);
    }
    if let Some(Value::Array(props)) = object.get("additionalProperty") {
        for prop in props {
            if let (Some(name), Some(value)) = (ld_text(prop.get("name")), ld_text(prop.get("value")))
            {
                product.specifications.insert(name, value);
            }
        }
    }

    for src in ld_images(object.get("image")) {
        if let Some(abs) = resolve_url(page_url, &src) {
            product.push_image(abs);
        }
    }

    product.price_text = ld_price(object.get("offers"));

    for href in pdf.all(html) {
        if let Some(abs) = resolve_url(page_url, &decode_entities(&href)) {
            product.push_pdf(abs);
        }
    }

    product.source_url = Some(page_url.to_string());
    Some(product)
}

fn ld_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => decode_entities(s.trim()),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn ld_images(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().flat_map(|v| ld_images(Some(v))).collect(),
        Some(Value::Object(o)) => ld_text(o.get("url").or_else(|| o.get("contentUrl")))
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn ld_price(offers: Option<&Value>) -> Option<String> {
    let offer = match offers? {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let price = ld_text(offer.get("price")).or_else(|| ld_text(offer.get("lowPrice")))?;
    Some(match ld_text(offer.get("priceCurrency")) {
        Some(currency) => format!("{price} {currency}"),
        None => price,
    })
}
