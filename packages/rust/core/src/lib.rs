//! Job orchestration for prodscout.
//!
//! This crate ties together discovery, the per-site scrapers, and AI
//! extraction into a single entry point, [`run_job`], that turns a compiled
//! job configuration into deduplicated records.

pub mod pipeline;

pub use pipeline::{ScrapeOutput, discover_site, run_job, scrape_with_ai};
