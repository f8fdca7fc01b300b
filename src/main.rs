use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use veille_news::config::Config;
use veille_news::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "veille_news=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("VEILLE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut config = Config::load_or_default(&config_path)?;
    config.apply_env_overrides()?;
    info!(
        "Using {:?} news strategy and {:?} favorites storage",
        config.news.strategy, config.storage.backend
    );

    let state = Arc::new(AppState::from_config(&config).await?);
    let cors = routes::cors_layer(config.frontend_origin.as_deref())?;
    let app = routes::router(state, cors);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server starting on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
