//! # Scour Core
//!
//! Domain types, traits, and error definitions for the scour research agent.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (LLM vendor, search vendor, page fetcher, code
//! runner) is defined as a port trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping vendors via configuration
//! - Testing the research loop with scripted/stub ports
//! - Clean dependency graph (all crates depend inward on core)

pub mod action;
pub mod cancel;
pub mod code;
pub mod error;
pub mod eval;
pub mod fetch;
pub mod knowledge;
pub mod llm;
pub mod research;
pub mod search;
pub mod state;
pub mod urls;

// Re-export key types at crate root for ergonomics
pub use action::{Action, ActionKind, AnswerDraft, AnswerReference, Permissions};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use code::{CodeLimits, CodeOutput, CodeRunner};
pub use error::{CodeError, ConfigError, Error, FetchError, LlmError, Result, SearchError};
pub use eval::{EvalDimension, EvalRequirements};
pub use fetch::{FetchOptions, FetchPort, FetchedPage};
pub use knowledge::{KnowledgeItem, KnowledgeKind};
pub use llm::{ChatMessage, ChatRole, Generated, GenerateOptions, LlmFailure, LlmPort, SchemaSpec, TokenUsage};
pub use research::{ActionCounts, Metrics, Reference, ResearchRequest, ResearchResult};
pub use search::{SearchHit, SearchPort, SearchQuery};
pub use state::ControllerState;
pub use urls::{UrlRecord, VisitState};
