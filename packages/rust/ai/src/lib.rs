//! Page understanding via a content-understanding service.
//!
//! Two operations, both over sanitized HTML and both infallible from the
//! caller's point of view:
//! - [`classify_page`] decides what kind of page this is and which product
//!   links it holds.
//! - [`extract_product`] turns a product detail page into a [`ScrapedProduct`].
//!
//! The service itself sits behind the [`ContentModel`] trait so callers
//! inject a concrete client ([`OpenRouterClient`]) or a test fake.
//!
//! [`ScrapedProduct`]: prodscout_shared::ScrapedProduct

pub mod client;
mod json;
pub mod page;

use std::future::Future;
use std::sync::Arc;

use prodscout_shared::Result;

pub use client::OpenRouterClient;
pub use page::{
    PageClassification, PageType, ProductExtraction, PromptContext, classify_page,
    extract_product,
};

/// A chat model that answers one system + user prompt with text.
pub trait ContentModel: Send + Sync {
    /// Run one completion. The reply is expected to be a JSON object but
    /// callers parse it defensively.
    fn complete(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send;
}

impl<M: ContentModel> ContentModel for Arc<M> {
    fn complete(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).complete(system, user)
    }
}

impl<M: ContentModel> ContentModel for &M {
    fn complete(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).complete(system, user)
    }
}
