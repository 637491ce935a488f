// =============================================================================
// MarketSentry — Main Entry Point
// =============================================================================
//
// Watchlist and price-alert backend: an Axum REST API over a SQLite registry,
// a Polygon.io market-data client with TTL response caches, and a background
// worker that evaluates alert rules on a fixed interval and delivers email
// notifications.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod cache;
mod config;
mod error;
mod indicators;
mod notify;
mod polygon;
mod rules;
mod store;
mod types;
mod worker;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::Config;
use crate::notify::EmailNotifier;
use crate::polygon::PolygonClient;
use crate::store::Store;
use crate::worker::AlertWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        MarketSentry — Starting Up                        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = Config::from_env();
    info!(
        db_path = %config.db_path.display(),
        bind_addr = %config.bind_addr,
        worker_enabled = config.worker.enabled,
        interval_secs = config.worker.interval.as_secs(),
        smtp_enabled = config.smtp.enabled(),
        "Configuration loaded"
    );

    // ── 2. Registry & market-data client ─────────────────────────────────
    let store = Arc::new(Store::open(&config.db_path)?);
    let market = Arc::new(PolygonClient::new(
        config.polygon_api_key.clone(),
        config.polygon_base_url.clone(),
    ));

    // ── 3. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config, store.clone(), market.clone()));

    // ── 4. Spawn the alert worker ────────────────────────────────────────
    if state.config.worker.enabled {
        let sink = Arc::new(EmailNotifier::new(state.config.smtp.clone()));
        let worker = AlertWorker::new(
            store.clone(),
            market.clone(),
            state.caches.history.clone(),
            sink,
            &state.config.worker,
        );
        tokio::spawn(async move {
            worker.run().await;
            error!("alert worker exited unexpectedly");
        });
        info!("Alert worker launched");
    } else {
        warn!("Alert worker disabled by configuration");
    }

    // ── 5. Start the API server ──────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let api_state = state.clone();
    tokio::spawn(async move {
        let app = api::routes::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    info!("MarketSentry shut down complete.");
    Ok(())
}
