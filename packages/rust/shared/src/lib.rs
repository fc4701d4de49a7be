//! Shared types, error model, configuration, and run plumbing for prodscout.
//!
//! This crate is the foundation depended on by all other prodscout crates.
//! It provides:
//! - [`ProdScoutError`]: the unified error type
//! - Domain types ([`ScrapedProduct`], [`ScrapedSection`], [`DiscoveryResult`])
//! - Configuration ([`AppConfig`], job files via [`JobSpec`] / [`JobConfig`])
//! - Run plumbing ([`HttpFetcher`], [`Deadline`], [`ProgressSink`], [`dedup_products`])

pub mod budget;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod job;
pub mod pattern;
pub mod progress;
pub mod types;
pub mod urls;

// Re-export public API at crate root for ergonomic imports.
pub use budget::Deadline;
pub use config::{
    AppConfig, DefaultsConfig, OpenRouterConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_api_key,
};
pub use dedup::{dedup_products, dedup_urls};
pub use error::{ProdScoutError, Result};
pub use fetch::{FetchOptions, HttpFetcher, USER_AGENT};
pub use job::{
    AiConfig, ApiConfig, ApiFields, BrowserConfig, BrowserPagination, BrowserSelectors,
    ExtractionMethod, GenericConfig, HtmlPatterns, HttpMethod, JobConfig, JobSpec, Pagination,
    RegulationConfig, RequestSettings, ShopifyConfig,
};
pub use pattern::Pattern;
pub use progress::{ProgressDetail, ProgressEvent, ProgressSink};
pub use types::{
    DiscoveryMethod, DiscoveryResult, ScrapedProduct, ScrapedSection, Specifications,
    collapse_whitespace,
};
