use anyhow::{Context, Result};
use ras_identity_core::InMemoryUserStore;
use ras_identity_session::JwtTokenIssuer;
use ras_identity_social::{ProviderRegistry, SocialAuth, ThumbnailQueue};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod routes;

use config::Config;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting social login server");

    let registry = ProviderRegistry::load(&[config.providers_entry()?])
        .context("Failed to load provider configuration")?;

    let store = Arc::new(InMemoryUserStore::new());
    let social_config = config.social_auth();
    let images = ThumbnailQueue::spawn(
        store.clone(),
        social_config.thumbnail_sizes.clone(),
        social_config.thumbnail_queue_capacity,
    );
    let issuer = JwtTokenIssuer::new(config.session());

    let social = SocialAuth::new(
        registry,
        &social_config,
        store,
        Arc::new(images),
        Arc::new(issuer),
    )
    .context("Failed to create social login service")?;

    let app = routes::router(AppState {
        social: Arc::new(social),
    });

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
