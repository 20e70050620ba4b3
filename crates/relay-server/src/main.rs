mod configuration;
mod error;
mod routes;
mod state;

use relay::providers::bedrock::BedrockProvider;
use relay::streaming::Relay;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let settings = configuration::Settings::new()?;
    let relay_config = settings.relay_config();

    // The provider client is built once and shared by every request
    let provider_config = settings.provider.into_config()?;
    info!(
        region = %provider_config.region,
        endpoint = %provider_config.endpoint(),
        model_id = %relay_config.model_id,
        "created bedrock client"
    );
    let provider = BedrockProvider::new(provider_config)?;
    let state = state::AppState::new(Relay::new(Arc::new(provider), relay_config));

    // Create app with all routes
    let app = routes::configure(state, &settings.server);

    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
