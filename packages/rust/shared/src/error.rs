//! Error types for prodscout.
//!
//! Library crates use [`ProdScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Most run-time failures never surface as errors: fetch and parse failures
//! are logged and degrade to "no data" at the request boundary. The variants
//! below are what crosses a function boundary before that happens.

use std::path::PathBuf;

/// Top-level error type for all prodscout operations.
#[derive(Debug, thiserror::Error)]
pub enum ProdScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during discovery or scraping.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, XML, or JSON content could not be interpreted.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Content-understanding service error (transport or response contract).
    #[error("service error: {0}")]
    Service(String),

    /// Headless browser launch or navigation error.
    #[error("browser error: {0}")]
    Browser(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, empty required field, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProdScoutError>;

impl ProdScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
