//! Configuration loading, validation, and management for scour.
//!
//! Layered load: built-in defaults, overlaid by an optional JSON config
//! file, overlaid by environment variables. Validates at startup —
//! invalid configuration aborts before any session exists.

use scour_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// The root configuration structure. Maps directly to the JSON file.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScourConfig {
    /// Research loop defaults, overridable per request.
    pub research: ResearchDefaults,

    /// LLM vendor selection and credentials.
    pub llm: LlmConfig,

    /// Search vendor selection and credentials.
    pub search: SearchConfig,

    /// Gateway bind address.
    pub gateway: GatewayConfig,

    /// Per-tool model overrides ("evaluator" → model name, etc.).
    pub tool_models: HashMap<String, String>,
}

impl Default for ScourConfig {
    fn default() -> Self {
        Self {
            research: ResearchDefaults::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            gateway: GatewayConfig::default(),
            tool_models: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchDefaults {
    pub token_budget: u64,
    pub max_steps: u32,
    pub max_duration_ms: u64,
    pub max_bad_attempts: u32,
    /// Fraction of the token budget spent before the forced final answer.
    pub beast_ratio: f64,
}

impl Default for ResearchDefaults {
    fn default() -> Self {
        Self {
            token_budget: 1_000_000,
            max_steps: 40,
            max_duration_ms: 300_000,
            max_bad_attempts: 2,
            beast_ratio: 0.85,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai", "openrouter", or "anthropic".
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Custom endpoint for OpenAI-compatible vendors.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key: None,
            base_url: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// "serper" or "brave".
    pub provider: String,
    pub api_key: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { provider: "serper".into(), api_key: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8642 }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ScourConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScourConfig")
            .field("research", &self.research)
            .field("llm", &self.llm)
            .field("search", &self.search)
            .field("gateway", &self.gateway)
            .field("tool_models", &self.tool_models)
            .finish()
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

impl ScourConfig {
    /// Layered load: defaults ← optional JSON file ← environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
                serde_json::from_str::<ScourConfig>(&raw)
                    .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?
            }
            None => ScourConfig::default(),
        };
        config.apply_env();
        config.validate()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Environment overlay. Variables win over the file.
    fn apply_env(&mut self) {
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let Some(v) = get("SCOUR_TOKEN_BUDGET").and_then(|v| v.parse().ok()) {
            self.research.token_budget = v;
        }
        if let Some(v) = get("SCOUR_MAX_STEPS").and_then(|v| v.parse().ok()) {
            self.research.max_steps = v;
        }
        if let Some(v) = get("SCOUR_MAX_DURATION_MS").and_then(|v| v.parse().ok()) {
            self.research.max_duration_ms = v;
        }
        if let Some(v) = get("SCOUR_MAX_BAD_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.research.max_bad_attempts = v;
        }
        if let Some(v) = get("SCOUR_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = get("SCOUR_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("SCOUR_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = get("SCOUR_SEARCH_PROVIDER") {
            self.search.provider = v;
        }
        // Vendor keys: generic first, then vendor-specific.
        if let Some(v) = get("SCOUR_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        } else {
            let vendor_key = match self.llm.provider.as_str() {
                "anthropic" => get("ANTHROPIC_API_KEY"),
                "openrouter" => get("OPENROUTER_API_KEY"),
                _ => get("OPENAI_API_KEY"),
            };
            if let Some(v) = vendor_key {
                self.llm.api_key = Some(v);
            }
        }
        if let Some(v) = get("SCOUR_SEARCH_API_KEY") {
            self.search.api_key = Some(v);
        } else {
            let vendor_key = match self.search.provider.as_str() {
                "brave" => get("BRAVE_API_KEY"),
                _ => get("SERPER_API_KEY"),
            };
            if let Some(v) = vendor_key {
                self.search.api_key = Some(v);
            }
        }
        if let Some(v) = get("SCOUR_GATEWAY_HOST") {
            self.gateway.host = v;
        }
        if let Some(v) = get("SCOUR_GATEWAY_PORT").and_then(|v| v.parse().ok()) {
            self.gateway.port = v;
        }
    }

    /// Startup validation. Credentials are checked when clients are
    /// built, not here, so offline commands still work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.research.token_budget == 0 {
            return Err(ConfigError::Invalid {
                key: "research.token_budget".into(),
                reason: "must be positive".into(),
            });
        }
        if self.research.max_steps == 0 {
            return Err(ConfigError::Invalid {
                key: "research.max_steps".into(),
                reason: "must be positive".into(),
            });
        }
        if !(0.0 < self.research.beast_ratio && self.research.beast_ratio <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "research.beast_ratio".into(),
                reason: "must be in (0, 1]".into(),
            });
        }
        match self.llm.provider.as_str() {
            "openai" | "openrouter" | "anthropic" => {}
            other => {
                return Err(ConfigError::Invalid {
                    key: "llm.provider".into(),
                    reason: format!("unknown provider '{other}'"),
                })
            }
        }
        match self.search.provider.as_str() {
            "serper" | "brave" => {}
            other => {
                return Err(ConfigError::Invalid {
                    key: "search.provider".into(),
                    reason: format!("unknown provider '{other}'"),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ScourConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.research.token_budget, 1_000_000);
        assert!((config.research.beast_ratio - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn file_overlays_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "research": {{ "max_steps": 7 }},
                "llm": {{ "provider": "anthropic", "model": "claude-sonnet-4-20250514" }}
            }}"#
        )
        .unwrap();

        let config = ScourConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.research.max_steps, 7);
        assert_eq!(config.llm.provider, "anthropic");
        // Untouched sections keep defaults.
        assert_eq!(config.research.token_budget, 1_000_000);
        assert_eq!(config.search.provider, "serper");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ScourConfig::load(Some(Path::new("/nonexistent/scour.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ScourConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_beast_ratio_rejected() {
        let mut config = ScourConfig::default();
        config.research.beast_ratio = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn unknown_providers_rejected() {
        let mut config = ScourConfig::default();
        config.llm.provider = "acme-llm".into();
        assert!(config.validate().is_err());

        let mut config = ScourConfig::default();
        config.search.provider = "altavista".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = ScourConfig::default();
        config.llm.api_key = Some("sk-secret".into());
        config.search.api_key = Some("serper-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("serper-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
