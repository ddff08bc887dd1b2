//! presenced - presence and room-messaging daemon.

use presenced::config::{Config, DatabaseBackend};
use presenced::db::Database;
use presenced::identity::oracle;
use presenced::network::Gateway;
use presenced::state::Hub;
use presenced::store::{MemoryStore, Store};
use presenced::telemetry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).inspect_err(|e| {
        eprintln!("failed to load {config_path}: {e}");
    })?;

    telemetry::init(&config.log);
    info!(server = %config.server.name, "Starting presenced");

    let store: Arc<dyn Store> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            let db = Database::new(&config.database.path).await.map_err(|e| {
                error!(path = %config.database.path, error = %e, "Failed to open database");
                e
            })?;
            Arc::new(db)
        }
        DatabaseBackend::Memory => {
            warn!("Using the in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let oracle = oracle::from_config(&config.identity)?;
    let hub = Hub::new(store, oracle, &config);
    let gateway = Gateway::bind(&config.listen, Arc::clone(&hub)).await?;

    tokio::select! {
        result = gateway.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Gateway stopped");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            hub.close_all();
        }
    }

    info!("presenced stopped");
    Ok(())
}
