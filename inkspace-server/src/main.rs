//! Inkspace relay daemon — headless WebSocket hub for collaborative
//! document rooms.
//!
//! Configuration is environment-driven:
//! - `INKSPACE_BIND` — listen address (default `127.0.0.1:9090`)
//! - `INKSPACE_DATA` — node store directory; set for a durable RocksDB
//!   store, unset for in-memory operation

use std::sync::Arc;

use log::info;

use inkspace_collab::{
    MemoryStore, NodeStore, RelayConfig, RelayServer, RocksNodeStore, StoreConfig,
};

fn main() {
    env_logger::init();

    let bind_addr =
        std::env::var("INKSPACE_BIND").unwrap_or_else(|_| "127.0.0.1:9090".to_string());

    let store: Arc<dyn NodeStore> = match std::env::var("INKSPACE_DATA") {
        Ok(path) => {
            info!("Opening node store at {path}");
            let config = StoreConfig {
                path: path.into(),
                ..StoreConfig::default()
            };
            match RocksNodeStore::open(config) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    log::error!("Failed to open node store: {e}");
                    std::process::exit(1);
                }
            }
        }
        Err(_) => {
            info!("No INKSPACE_DATA set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let config = RelayConfig {
        bind_addr,
        ..RelayConfig::default()
    };

    info!("Starting Inkspace relay on {}", config.bind_addr);

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    runtime.block_on(async {
        let server = RelayServer::new(config, store);
        if let Err(e) = server.run().await {
            log::error!("Relay stopped: {e}");
            std::process::exit(1);
        }
    });
}
