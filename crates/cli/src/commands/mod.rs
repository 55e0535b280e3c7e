//! CLI subcommands and the port wiring they share.

pub mod gateway;
pub mod research;

use scour_agent::{ControllerSettings, ResearchController};
use scour_config::ScourConfig;
use scour_core::{CodeRunner, ConfigError, FetchPort, LlmPort, SearchPort};
use scour_providers::{AnthropicClient, ChatVendor, OpenAiCompatClient, StructuredClient, TokenBucket};
use scour_tools::{BraveSearch, FuelCodeRunner, PageFetcher, SerperSearch};
use std::sync::Arc;

/// Build the research controller from validated configuration.
pub fn build_controller(config: &ScourConfig) -> Result<ResearchController, ConfigError> {
    let llm = build_llm(config)?;
    let search = build_search(config)?;
    let fetch: Arc<dyn FetchPort> = Arc::new(PageFetcher::new());
    let code: Arc<dyn CodeRunner> = Arc::new(FuelCodeRunner::new());

    let settings = ControllerSettings {
        beast_ratio: config.research.beast_ratio,
        ..Default::default()
    };
    Ok(ResearchController::new(llm, search, fetch, code).with_settings(settings))
}

fn build_llm(config: &ScourConfig) -> Result<Arc<dyn LlmPort>, ConfigError> {
    let api_key = config
        .llm
        .api_key
        .clone()
        .ok_or_else(|| ConfigError::Missing(format!("API key for LLM provider '{}'", config.llm.provider)))?;

    let vendor: Arc<dyn ChatVendor> = match config.llm.provider.as_str() {
        "anthropic" => Arc::new(AnthropicClient::new(api_key, config.llm.model.clone())),
        "openrouter" => Arc::new(OpenAiCompatClient::openrouter(api_key, config.llm.model.clone())),
        _ => match &config.llm.base_url {
            Some(base_url) => Arc::new(OpenAiCompatClient::new(
                "openai",
                base_url.clone(),
                api_key,
                config.llm.model.clone(),
            )),
            None => Arc::new(OpenAiCompatClient::openai(api_key, config.llm.model.clone())),
        },
    };

    // Process-wide bucket per vendor: burst of 10, 2 req/s sustained.
    let limiter = Arc::new(TokenBucket::new(10, 2.0));
    Ok(Arc::new(StructuredClient::new(vendor).with_limiter(limiter)))
}

fn build_search(config: &ScourConfig) -> Result<Arc<dyn SearchPort>, ConfigError> {
    let api_key = config.search.api_key.clone().ok_or_else(|| {
        ConfigError::Missing(format!("API key for search provider '{}'", config.search.provider))
    })?;

    Ok(match config.search.provider.as_str() {
        "brave" => Arc::new(BraveSearch::new(api_key)),
        _ => Arc::new(SerperSearch::new(api_key)),
    })
}
