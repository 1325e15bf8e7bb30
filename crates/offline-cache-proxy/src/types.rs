//! Core types for the offline cache proxy

use offline_cache::{CacheStats, LifecycleState, OfflineCacheConfig};
use serde::Serialize;
use std::path::PathBuf;
use url::Url;

const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// Configuration for the proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub origin_url: Url,
    pub cache_version: String,
    /// File storage root; in-memory storage when unset
    pub cache_dir: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    /// First delay between install attempts; doubles after each failure
    pub install_retry_secs: u64,
    pub install_retry_max_secs: u64,
}

impl ProxyConfig {
    /// Caching layer configuration for this deployment
    pub fn cache_config(&self) -> OfflineCacheConfig {
        OfflineCacheConfig::with_version(self.origin_url.clone(), &self.cache_version)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3005,
            origin_url: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            cache_version: "v1.2.0".to_string(),
            cache_dir: None,
            fetch_timeout_secs: 30,
            install_retry_secs: 5,
            install_retry_max_secs: 300,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: LifecycleState,
    pub uptime_secs: u64,
    pub partitions: Vec<String>,
    pub cache: CacheStats,
}
