//! `scour gateway` — serve the HTTP chat-completions adapter.

use scour_config::ScourConfig;
use scour_gateway::{build_router, GatewayState};
use std::sync::Arc;
use tracing::info;

pub async fn run(config: ScourConfig, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let controller = Arc::new(super::build_controller(&config)?);
    let state = Arc::new(GatewayState {
        controller,
        defaults: config.research.clone(),
    });

    let addr = format!("{}:{}", config.gateway.host, port.unwrap_or(config.gateway.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "gateway listening");

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
