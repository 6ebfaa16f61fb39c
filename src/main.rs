mod alert;
mod channels;
mod config;
mod dispatcher;
mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, TRUSTED_GRAPH_PREFIX};
use crate::dispatcher::Dispatcher;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,alertrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Listen: {}", config.server.listen);
    info!("  Allowed IPs: {:?}", config.server.allowed_ips);
    info!("  Delivery timeout: {}s", config.server.delivery_timeout_secs);
    info!("  Channels: {:?}", config.enabled_channels());

    if config.teams_api.enabled && !config.teams_api.endpoint.starts_with(TRUSTED_GRAPH_PREFIX) {
        warn!(
            "teams_api.endpoint is not under {}; Teams API alerts will be rejected",
            TRUSTED_GRAPH_PREFIX
        );
    }

    let dispatcher = Dispatcher::from_config(&config)?;
    info!("Dispatcher ready: {:?}", dispatcher.channel_names());
    let listen = config.server.listen;
    let state = AppState::new(config, dispatcher);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind to {}", listen))?;

    info!("Webhook receiver listening on http://{}/webhook", listen);
    server::serve(listener, state).await?;

    Ok(())
}
