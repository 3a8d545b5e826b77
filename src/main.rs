//! Chat Relay Server
//!
//! HTTP service that forwards chat page messages to an Azure OpenAI deployment

use anyhow::{Context, Result};
use chatrelay::utils::logging::init_logging;
use chatrelay::{create_router, version_info, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load settings from environment (and .env)
    let settings = Settings::new().context("Failed to load server settings")?;

    // Initialize logging
    init_logging(&settings.logging)?;
    info!("{}", version_info());

    // Create router
    let app = create_router(settings.clone()).await?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("🚀 Chat relay server started!");
    info!("📝 Health check: http://{}/health", addr);
    info!("💬 Chat endpoint: http://{}/chat/send", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

    Ok(())
}
