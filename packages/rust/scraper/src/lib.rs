//! Per-site product extraction for prodscout.
//!
//! - [`GenericScraper`]: pattern-driven listing/detail scraping and the
//!   structured API mode
//! - [`ShopifyScraper`]: storefront catalog adapter
//! - [`BrowserScraper`] / [`RegulationScraper`]: headless Chromium flows
//!
//! Scrapers never fail at run time. Fetch and parse failures are logged and
//! the run continues with whatever was collected.

pub mod api;
pub mod batch;
pub mod browser;
pub mod engine;
pub mod identity;
pub mod patterns;
pub mod shopify;

pub use batch::{BatchPlan, run_batches};
pub use browser::{BrowserScraper, RegulationScraper, extract_detail, extract_listing, extract_sections};
pub use engine::GenericScraper;
pub use identity::{UrlIdentity, identify, product_from_url};
pub use shopify::ShopifyScraper;
