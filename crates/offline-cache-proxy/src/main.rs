//! Offline Cache Proxy - serves a site through the offline caching layer
//!
//! Stands in for the browser: installs and activates the cache at startup,
//! then intercepts every request and resolves it from the cache partitions or
//! the origin.

mod error;
mod server;
mod startup;
mod types;

use crate::error::{ProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::startup::install_until_active;
use crate::types::ProxyConfig;
use offline_cache::{
    CacheStorage, FileCacheStorage, HttpFetcher, LifecycleController, MemoryCacheStorage,
    OfflineCacheError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("offline_cache_proxy=info".parse()?)
        .add_directive("offline_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting offline cache proxy...");

    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Origin: {}", config.origin_url);
    info!("Cache version: {}", config.cache_version);
    info!("Cache dir: {:?}", config.cache_dir);

    let storage: Arc<dyn CacheStorage> = match &config.cache_dir {
        Some(dir) => {
            let storage = FileCacheStorage::new(dir.clone());
            storage.init().await?;
            Arc::new(storage)
        }
        None => Arc::new(MemoryCacheStorage::new()),
    };

    let timeout = Duration::from_secs(config.fetch_timeout_secs);
    let fetcher = Arc::new(HttpFetcher::new(timeout)?);
    let controller = LifecycleController::new(config.cache_config(), storage, fetcher);

    let upstream = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(OfflineCacheError::from)?;

    let state: SharedState = Arc::new(ServerState::new(controller, upstream));

    // Requests pass through until install and activate have succeeded
    let initial_delay = Duration::from_secs(config.install_retry_secs);
    let max_delay = Duration::from_secs(config.install_retry_max_secs);
    tokio::spawn({
        let state = state.clone();
        async move {
            install_until_active(&state.controller, initial_delay, max_delay).await;
        }
    });

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

fn load_config() -> Result<ProxyConfig> {
    let defaults = ProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let origin_url = match std::env::var("ORIGIN_URL") {
        Ok(raw) => Url::parse(&raw)?,
        Err(_) => defaults.origin_url,
    };

    let cache_version = std::env::var("CACHE_VERSION").unwrap_or(defaults.cache_version);

    let cache_dir = std::env::var("CACHE_DIR").ok().map(PathBuf::from);

    let fetch_timeout_secs = std::env::var("FETCH_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.fetch_timeout_secs);

    let install_retry_secs = std::env::var("INSTALL_RETRY_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.install_retry_secs);

    let install_retry_max_secs = std::env::var("INSTALL_RETRY_MAX_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.install_retry_max_secs);

    Ok(ProxyConfig {
        port,
        origin_url,
        cache_version,
        cache_dir,
        fetch_timeout_secs,
        install_retry_secs,
        install_retry_max_secs,
    })
}
