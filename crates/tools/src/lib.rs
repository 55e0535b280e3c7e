//! # Scour Tools
//!
//! External tool ports: web search vendors ([`SerperSearch`],
//! [`BraveSearch`]), the [`PageFetcher`] with HTML-to-text extraction,
//! and the [`FuelCodeRunner`] — an in-process, fuel-capped expression
//! interpreter that is isolated by construction (no network or
//! filesystem reachable from the language).

pub mod code_runner;
pub mod fetch;
pub mod html;
pub mod search;

pub use code_runner::FuelCodeRunner;
pub use fetch::PageFetcher;
pub use search::{BraveSearch, SerperSearch};
