use std::time::Duration;

use anyhow::Context;
use protocol_api::app::{router, AppState};
use protocol_api::config;
use protocol_api::database::DatabaseManager;
use protocol_api::services::spawn_token_cleanup;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .init();

    let config = config::config().clone();
    tracing::info!("Starting Protocol API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set outside development");
    }

    let db = DatabaseManager::connect(&config.database)
        .await
        .context("failed to open database")?;
    db.migrate().await.context("failed to migrate database")?;

    let cleanup = spawn_token_cleanup(
        db.pool().clone(),
        Duration::from_secs(config.maintenance.token_cleanup_interval_secs.max(1)),
    );

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Protocol API listening on http://{}", bind_addr);

    let app = router(AppState::new(db.pool().clone(), config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cleanup.abort();
    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
