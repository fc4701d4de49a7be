//! Core domain types produced by every extraction strategy.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Specifications
// ---------------------------------------------------------------------------

/// Ordered string→string map of product specifications.
///
/// Keys are unique; inserting an existing key replaces its value in place so
/// the original position is kept. Serializes as a JSON object in insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Specifications(Vec<(String, String)>);

impl Specifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key. Blank keys or values are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().trim().to_string();
        let value = value.into().trim().to_string();
        if key.is_empty() || value.is_empty() {
            return;
        }
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Specifications {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut specs = Self::new();
        for (k, v) in iter {
            specs.insert(k, v);
        }
        specs
    }
}

impl Serialize for Specifications {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Specifications {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = Specifications;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of specification names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut specs = Specifications::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    specs.insert(k, v);
                }
                Ok(specs)
            }
        }

        deserializer.deserialize_map(SpecVisitor)
    }
}

// ---------------------------------------------------------------------------
// ScrapedProduct
// ---------------------------------------------------------------------------

/// A normalized product record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedProduct {
    /// Display name. Never empty for a record that leaves an extractor.
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub specifications: Specifications,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_text: Option<String>,
    /// Absolute document URLs, in discovery order.
    #[serde(default)]
    pub pdf_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    /// Canonical identity of the product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ScrapedProduct {
    /// Start a record with just a name. Returns `None` for a blank name.
    pub fn named(name: impl AsRef<str>) -> Option<Self> {
        let name = collapse_whitespace(name.as_ref());
        if name.is_empty() {
            return None;
        }
        Some(Self {
            product_name: name,
            ..Default::default()
        })
    }

    /// Identity used for deduplication: `source_url`, else `product_name`.
    pub fn dedup_key(&self) -> &str {
        match self.source_url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => &self.product_name,
        }
    }

    /// Append a PDF URL unless it is already present.
    pub fn push_pdf(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.pdf_urls.contains(&url) {
            self.pdf_urls.push(url);
        }
    }

    /// Append an image URL unless it is already present.
    pub fn push_image(&mut self, url: impl Into<String>) {
        let url = url.into();
        let images = self.image_urls.get_or_insert_with(Vec::new);
        if !images.contains(&url) {
            images.push(url);
        }
    }
}

// ---------------------------------------------------------------------------
// ScrapedSection
// ---------------------------------------------------------------------------

/// One heading-delimited section of regulation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    pub section_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Which strategy produced a set of discovered product URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    Sitemap,
    AiNavigation,
    Both,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::AiNavigation => "ai-navigation",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of product URL discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Deduplicated product URLs, capped.
    pub product_urls: Vec<String>,
    pub method: DiscoveryMethod,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Collapse whitespace runs to single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
