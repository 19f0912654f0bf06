//! Betting decision engine HTTP service.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires odds providers and the snapshot store into the decision engine,
//! and serves the API until Ctrl+C.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use betting_engine::api::{self, routes::ApiState};
use betting_engine::config::AppConfig;
use betting_engine::odds::http::HttpOddsProvider;
use betting_engine::odds::OddsProvider;
use betting_engine::storage::{MemoryOddsStore, OddsStore, SqliteOddsStore};
use betting_engine::strategy::DecisionEngine;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path =
        std::env::var("BETTING_ENGINE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = if Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        AppConfig::default()
    };

    info!(
        providers = cfg.providers.len(),
        min_edge = format!("{:.1}%", cfg.kelly.min_edge * 100.0),
        max_stake = format!("{:.1}%", cfg.kelly.max_stake_pct * 100.0),
        iterations = cfg.kelly.simulation_iterations,
        "Betting engine starting up"
    );

    // -- Odds providers --------------------------------------------------

    let mut providers: Vec<Arc<dyn OddsProvider>> = Vec::with_capacity(cfg.providers.len());
    for p in &cfg.providers {
        let api_key = match p.api_key_env.as_deref() {
            Some(env) => match AppConfig::resolve_env(env) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(provider = %p.name, error = %e, "API key missing, calling without it");
                    None
                }
            },
            None => None,
        };
        providers.push(Arc::new(HttpOddsProvider::new(
            &p.name,
            &p.base_url,
            api_key,
            p.reliability,
            Duration::from_secs(p.timeout_secs),
        )?));
        info!(provider = %p.name, base_url = %p.base_url, "Odds provider registered");
    }
    if providers.is_empty() {
        warn!("No odds providers configured; /api/odds and /api/decide will fail");
    }

    // -- Snapshot store --------------------------------------------------

    let retention = cfg.timing.retention();
    let mut memory_store: Option<Arc<MemoryOddsStore>> = None;
    let store: Arc<dyn OddsStore> = match cfg.store.database_url.as_deref() {
        Some(url) => Arc::new(SqliteOddsStore::connect(url, retention).await?),
        None => {
            let memory = Arc::new(match cfg.store.snapshot_file.as_deref() {
                Some(path) => MemoryOddsStore::load_json(path, retention)?,
                None => MemoryOddsStore::new(retention),
            });
            memory_store = Some(memory.clone());
            memory
        }
    };
    info!(store = store.name(), "Odds history store ready");

    let engine = Arc::new(DecisionEngine::from_config(&cfg, providers, store));

    // -- Serve -----------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if cfg.server.enabled {
        let state = Arc::new(ApiState::new(engine.clone()));
        tokio::select! {
            result = api::serve(state, cfg.server.port) => {
                if let Err(e) = result {
                    error!(error = %e, "API server stopped");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
            }
        }
    } else {
        info!("API server disabled. Press Ctrl+C to stop.");
        shutdown.await?;
        info!("Shutdown signal received.");
    }

    if let (Some(memory), Some(path)) = (memory_store, cfg.store.snapshot_file.as_deref()) {
        memory.save_json(path).await?;
    }

    info!(
        cached_odds = engine.aggregator().cached_entries().await,
        "Betting engine shut down cleanly."
    );

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("betting_engine=info"));

    let json_logging = std::env::var("BETTING_ENGINE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
