use log::{error, info, warn};
use std::net::SocketAddr;

use rusty_auth::config::AuthConfig;
use rusty_auth::core::spawn_refresh_token_purge;
use rusty_auth::handlers::{routes, AppState};
use rusty_auth::storage::create_memory_store;

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Initialize logging
    env_logger::init();

    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, issuer={}, rate={}/s burst={}",
        config.host,
        config.port,
        config.jwt_issuer,
        config.rate_limit_per_sec,
        config.rate_limit_burst
    );
    if config.expose_reset_token {
        warn!("Reset tokens are returned in forgot-password responses");
    }

    let store = create_memory_store();
    let state = match AppState::new(&config, store.clone()) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize services: {}", e);
            std::process::exit(1);
        }
    };

    // Expired refresh tokens are removed off the request path
    let _purge = spawn_refresh_token_purge(store, config.purge_interval);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Rusty Auth server on {}", addr);
    warp::serve(routes(state)).run(addr).await;
}
