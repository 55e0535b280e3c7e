//! Code runner port — isolated evaluation of small programs.
//!
//! Implementations must isolate: no network, no filesystem, and both a
//! wall-clock and an operation (fuel) cap.

use crate::error::CodeError;
use async_trait::async_trait;
use std::time::Duration;

/// Resource caps for one run.
#[derive(Debug, Clone)]
pub struct CodeLimits {
    pub wall: Duration,
    /// Interpreter operations before the run is aborted.
    pub fuel: u64,
}

impl Default for CodeLimits {
    fn default() -> Self {
        Self { wall: Duration::from_secs(5), fuel: 100_000 }
    }
}

/// Output of one run.
#[derive(Debug, Clone)]
pub struct CodeOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_ok: bool,
}

/// The code runner port.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `program` with `inputs` available to it (the knowledge
    /// snapshot, as JSON) under `limits`.
    async fn run(
        &self,
        program: &str,
        inputs: &serde_json::Value,
        limits: &CodeLimits,
    ) -> std::result::Result<CodeOutput, CodeError>;
}
