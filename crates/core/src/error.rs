//! Error types for the scour domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each port has its own error enum; the taxonomy distinguishes retryable
//! transport failures from client errors, timeouts, and validation failures.

use thiserror::Error;

/// The top-level error type for all scour operations.
///
/// Only `Config` and `Cancelled` ever escape a research session to the
/// caller; every other variant is absorbed by the controller into tool
/// failure accounting.
#[derive(Debug, Error)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Code runner error: {0}")]
    Code(#[from] CodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the LLM port.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by vendor, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Output validation failed after all fallbacks: {0}")]
    Validation(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Vendor not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Whether the transport retry loop should try this call again.
    ///
    /// 5xx, network failures, and rate limits are retryable; 4xx other
    /// than 429, auth failures, and validation failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::ApiError { status_code, .. } => *status_code >= 500,
            LlmError::RateLimited { .. } | LlmError::Network(_) => true,
            _ => false,
        }
    }
}

/// Errors from the search port.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Search API failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by search vendor")]
    RateLimited,

    #[error("Search timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Search vendor not configured: {0}")]
    NotConfigured(String),
}

/// Errors from the fetch port.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("Fetch timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors from the code runner.
#[derive(Debug, Clone, Error)]
pub enum CodeError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Fuel exhausted after {0} operations")]
    FuelExhausted(u64),

    #[error("Execution timed out")]
    Timeout,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Configuration errors. Not retryable; abort session creation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Failed to read config file: {0}")]
    Io(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),
}
