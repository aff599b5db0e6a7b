//! Threat Dashboard - real-time security data-serving backend
//!
//! Serves cached threat, vendor, and analytics records over a JSON API and
//! pushes live updates to WebSocket subscribers:
//! - File-backed memoizing cache with explicit refresh
//! - Filtered, paginated queries over the cached collections
//! - Fire-and-forget broadcast to a churning subscriber set
//! - Periodic simulation clock for exercising the live path

mod cache;
mod config;
mod error;
mod live;
mod model;
mod query;
mod web;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Starting Threat Dashboard...");

    // Load configuration
    let config = config::Config::load()?;
    info!("Configuration loaded");

    // File-backed cache over the data directory; fail fast if a core unit
    // cannot be loaded.
    let cache = Arc::new(cache::DataCache::new(&config.data.dir));
    cache.initialize().await?;

    let query = query::QueryService::new(cache);
    let registry = Arc::new(live::SubscriberRegistry::new());
    let broadcaster = live::Broadcaster::new(registry.clone(), query.clone());
    let simulator = live::simulator::SimulationClock::new(
        query.clone(),
        broadcaster.clone(),
        Duration::from_millis(config.simulation.interval_ms),
    );

    let state = Arc::new(web::AppState {
        query,
        registry,
        broadcaster,
        simulator,
    });

    // Start web server (blocking)
    web::start_server(&config, state).await?;

    Ok(())
}
