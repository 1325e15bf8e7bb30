//! Immutable configuration injected into the lifecycle controller

use chrono::Duration;
use url::Url;

use crate::error::{OfflineCacheError, Result};

const DEFAULT_VERSION: &str = "v1.2.0";
const PARTITION_PREFIX: &str = "olabiba";

/// Same-origin paths seeded into the static partition on install
const STATIC_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/index-en.html",
    "/index-es.html",
    "/faq.html",
    "/faq-en.html",
    "/faq-es.html",
    "/assets/css/tailwind-minimal.css",
    "/assets/css/style.css",
    "/assets/js/main.js",
    "/assets/img/Olabiba-logo-tagline.webp",
    "/assets/img/Characters2.webp",
];

/// Cross-origin URLs seeded into the dynamic partition on install
const EXTERNAL_MANIFEST: &[&str] = &[
    "https://fonts.googleapis.com/css2?family=Noto+Kufi+Arabic:wght@400;500;700&display=swap",
];

/// Hosts whose resources are served stale-while-revalidate
const EXTERNAL_HOSTS: &[&str] = &[
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "cdn.tailwindcss.com",
    "cdnjs.cloudflare.com",
];

/// Time-to-live per resource class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlTable {
    pub static_asset: Duration,
    pub image: Duration,
    pub external: Duration,
    pub html: Duration,
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            static_asset: Duration::days(30),
            image: Duration::days(7),
            external: Duration::days(1),
            html: Duration::hours(1),
        }
    }
}

/// Presentation defaults for push notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub default_title: String,
    pub icon: String,
    pub badge: String,
    pub open_action_title: String,
    pub close_action_title: String,
    pub default_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: "Olabiba".to_string(),
            icon: "/assets/img/Characters1.png".to_string(),
            badge: "/assets/img/Olabiba-logo-tagline.png".to_string(),
            open_action_title: "فتح التطبيق".to_string(),
            close_action_title: "إغلاق".to_string(),
            default_url: "/".to_string(),
        }
    }
}

/// Everything the caching layer needs to know about the deployment
#[derive(Debug, Clone)]
pub struct OfflineCacheConfig {
    /// Origin the static manifest paths are resolved against
    pub origin: Url,
    pub static_partition: String,
    pub dynamic_partition: String,
    pub ttl: TtlTable,
    pub static_manifest: Vec<String>,
    pub external_manifest: Vec<String>,
    pub external_hosts: Vec<String>,
    pub notification: NotificationConfig,
}

impl OfflineCacheConfig {
    /// Default manifests with both partition names derived from one version tag
    pub fn with_version(origin: Url, version: &str) -> Self {
        Self {
            origin,
            static_partition: format!("{}-static-{}", PARTITION_PREFIX, version),
            dynamic_partition: format!("{}-dynamic-{}", PARTITION_PREFIX, version),
            ttl: TtlTable::default(),
            static_manifest: STATIC_MANIFEST.iter().map(|s| s.to_string()).collect(),
            external_manifest: EXTERNAL_MANIFEST.iter().map(|s| s.to_string()).collect(),
            external_hosts: EXTERNAL_HOSTS.iter().map(|s| s.to_string()).collect(),
            notification: NotificationConfig::default(),
        }
    }

    pub fn new(origin: Url) -> Self {
        Self::with_version(origin, DEFAULT_VERSION)
    }

    /// Absolute URLs of the static manifest, resolved against the origin
    pub fn static_seed_urls(&self) -> Result<Vec<Url>> {
        self.static_manifest
            .iter()
            .map(|path| self.origin.join(path).map_err(OfflineCacheError::from))
            .collect()
    }

    pub fn external_seed_urls(&self) -> Result<Vec<Url>> {
        self.external_manifest
            .iter()
            .map(|url| Url::parse(url).map_err(OfflineCacheError::from))
            .collect()
    }

    /// Names of the partitions that survive activation
    pub fn current_partitions(&self) -> [&str; 2] {
        [
            self.static_partition.as_str(),
            self.dynamic_partition.as_str(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://olabiba.example").unwrap()
    }

    #[test]
    fn test_default_partition_names() {
        let config = OfflineCacheConfig::new(origin());
        assert_eq!(config.static_partition, "olabiba-static-v1.2.0");
        assert_eq!(config.dynamic_partition, "olabiba-dynamic-v1.2.0");
    }

    #[test]
    fn test_version_bumps_both_partitions() {
        let config = OfflineCacheConfig::with_version(origin(), "v2.0.0");
        assert_eq!(
            config.current_partitions(),
            ["olabiba-static-v2.0.0", "olabiba-dynamic-v2.0.0"]
        );
    }

    #[test]
    fn test_default_ttls() {
        let ttl = TtlTable::default();
        assert_eq!(ttl.static_asset, Duration::days(30));
        assert_eq!(ttl.image, Duration::days(7));
        assert_eq!(ttl.external, Duration::hours(24));
        assert_eq!(ttl.html, Duration::minutes(60));
    }

    #[test]
    fn test_static_seed_urls_resolve_against_origin() {
        let config = OfflineCacheConfig::new(origin());
        let urls = config.static_seed_urls().unwrap();
        assert_eq!(urls.len(), 12);
        assert_eq!(urls[0].as_str(), "https://olabiba.example/");
        assert_eq!(
            urls[7].as_str(),
            "https://olabiba.example/assets/css/tailwind-minimal.css"
        );
    }

    #[test]
    fn test_external_seed_urls() {
        let config = OfflineCacheConfig::new(origin());
        let urls = config.external_seed_urls().unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].host_str(), Some("fonts.googleapis.com"));
    }
}
