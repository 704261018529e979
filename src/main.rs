mod config;
mod errors;
mod models;
mod relay;
mod routes;
mod service;
mod upstream;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::service::relay_service::RelayService;
use crate::upstream::CozeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coze_relay=debug,tower_http=debug".into()),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = AppConfig::from_env();
    if !config.has_access_token() {
        warn!("COZE_ACCESS_TOKEN is not set; upstream calls will be rejected");
    }
    info!(?config, "Configuration loaded");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let client = CozeClient::new(&config)?;
    let relay = RelayService::new(Arc::new(client), config.bot_id.clone());

    // ── Router ────────────────────────────────────────────────────────────────
    let app = routes::build_router(relay, &config.static_dir);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
