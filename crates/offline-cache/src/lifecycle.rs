//! Install / activate / fetch orchestration
//!
//! The controller moves through `uninstalled → installing → installed →
//! activating → active`. Install seeds both partitions, activate purges
//! partitions left behind by older versions, and only an active controller
//! answers intercepted requests.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};
use url::Url;

use crate::classify::Classifier;
use crate::config::OfflineCacheConfig;
use crate::error::{OfflineCacheError, Result};
use crate::fetch::Fetcher;
use crate::notification::{ClickOutcome, Notification, NotificationHooks, NotificationHost};
use crate::partition::CacheStoreManager;
use crate::policy::{Clock, ExpirationPolicy, SystemClock};
use crate::storage::CacheStorage;
use crate::strategy::{Resolution, Strategy, StrategyContext};
use crate::types::{CacheStats, Method, Request};

const BACKGROUND_SYNC_TAG: &str = "background-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    /// Installed and waiting to activate
    Installed,
    Activating,
    Active,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninstalled => "uninstalled",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host should do with an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not handled; send it to the network untouched
    Passthrough,
    Respond(Resolution),
}

/// Number of entries written per partition during install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub static_entries: usize,
    pub dynamic_entries: usize,
}

pub struct LifecycleController {
    config: Arc<OfflineCacheConfig>,
    classifier: Classifier,
    manager: CacheStoreManager,
    strategies: StrategyContext,
    notifications: NotificationHooks,
    state: Mutex<LifecycleState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl LifecycleController {
    pub fn new(
        config: OfflineCacheConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self::with_clock(config, storage, fetcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: OfflineCacheConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let classifier = Classifier::from_config(&config);
        let policy = ExpirationPolicy::new(config.ttl.clone());
        let notifications = NotificationHooks::new(config.notification.clone());

        Self {
            config: Arc::new(config),
            classifier,
            manager: CacheStoreManager::new(storage),
            strategies: StrategyContext::new(fetcher, policy, clock),
            notifications,
            state: Mutex::new(LifecycleState::Uninstalled),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &OfflineCacheConfig {
        &self.config
    }

    pub fn manager(&self) -> &CacheStoreManager {
        &self.manager
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> CacheStats {
        self.strategies.stats()
    }

    /// Whether a successful install asked to skip the waiting phase
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Whether activation claimed the open pages
    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Wait for detached background revalidations to finish
    pub async fn settle(&self) {
        self.strategies.settle().await;
    }

    fn set_state(&self, to: LifecycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !from.contains(&*state) {
            return Err(OfflineCacheError::InvalidTransition {
                from: state.to_string(),
                to: to.to_string(),
            });
        }
        debug!(from = %*state, to = %to, "Lifecycle transition");
        *state = to;
        Ok(())
    }

    /// Seed both partitions from their manifests.
    ///
    /// A partition is only written once every one of its seed fetches
    /// succeeded. On failure the controller falls back to `uninstalled` so a
    /// later install can retry, and skip-waiting is not requested.
    pub async fn install(&self) -> Result<InstallReport> {
        self.transition(&[LifecycleState::Uninstalled], LifecycleState::Installing)?;
        info!(
            static_partition = %self.config.static_partition,
            dynamic_partition = %self.config.dynamic_partition,
            "Installing offline cache"
        );

        match self.seed_all().await {
            Ok(report) => {
                self.set_state(LifecycleState::Installed);
                self.skip_waiting.store(true, Ordering::SeqCst);
                info!(
                    static_entries = report.static_entries,
                    dynamic_entries = report.dynamic_entries,
                    "Offline cache installed"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Offline cache installation failed");
                self.set_state(LifecycleState::Uninstalled);
                Err(e)
            }
        }
    }

    async fn seed_all(&self) -> Result<InstallReport> {
        let static_urls = self.config.static_seed_urls()?;
        let external_urls = self.config.external_seed_urls()?;

        let (static_entries, dynamic_entries) = futures::try_join!(
            self.seed(&self.config.static_partition, static_urls),
            self.seed(&self.config.dynamic_partition, external_urls),
        )?;

        Ok(InstallReport {
            static_entries,
            dynamic_entries,
        })
    }

    async fn seed(&self, name: &str, urls: Vec<Url>) -> Result<usize> {
        let partition = self.manager.open(name).await?;
        debug!(partition = name, count = urls.len(), "Seeding partition");

        let fetches = urls.into_iter().map(|url| async move {
            let key = url.to_string();
            let request = Request::new(Method::GET, url);
            let response = match self.strategies.fetcher().fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    return Err(OfflineCacheError::Seed {
                        url: key,
                        reason: e.to_string(),
                    })
                }
            };
            if !response.is_ok() {
                return Err(OfflineCacheError::Seed {
                    url: key,
                    reason: format!("status {}", response.status),
                });
            }
            Ok((request, response))
        });
        let fetched = futures::future::try_join_all(fetches).await?;

        let now = self.strategies.clock().now();
        let count = fetched.len();
        for (request, response) in fetched {
            partition
                .put(request.cache_key(), response.stamped(now))
                .await?;
        }

        info!(partition = name, count, "Seeded partition");
        Ok(count)
    }

    /// Purge obsolete partitions and claim open pages.
    /// Returns the names of the deleted partitions.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.transition(&[LifecycleState::Installed], LifecycleState::Activating)?;
        info!("Activating offline cache");

        match self
            .manager
            .purge_obsolete(&self.config.current_partitions())
            .await
        {
            Ok(deleted) => {
                self.clients_claimed.store(true, Ordering::SeqCst);
                self.set_state(LifecycleState::Active);
                info!(deleted = deleted.len(), "Offline cache activated");
                Ok(deleted)
            }
            Err(e) => {
                error!(error = %e, "Offline cache activation failed");
                self.set_state(LifecycleState::Installed);
                Err(e)
            }
        }
    }

    /// Resolve an intercepted request
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !request.is_read() {
            debug!(method = %request.method, url = %request.url, "Passing through non-read request");
            return FetchOutcome::Passthrough;
        }
        if self.state() != LifecycleState::Active {
            debug!(url = %request.url, state = %self.state(), "Not active, passing through");
            return FetchOutcome::Passthrough;
        }

        let class = self.classifier.classify(&request.url);
        let strategy = Strategy::for_class(class);
        let partition = self.manager.handle(self.partition_for(strategy));
        let fallback = [self.manager.handle(self.fallback_for(strategy))];
        debug!(
            url = %request.url,
            class = %class,
            strategy = strategy.as_str(),
            partition = partition.name(),
            "Dispatching request"
        );

        let resolution = strategy
            .resolve(&self.strategies, request, class, &partition, &fallback)
            .await;
        FetchOutcome::Respond(resolution)
    }

    /// Cache-first reads the static partition; everything else the dynamic one
    fn partition_for(&self, strategy: Strategy) -> &str {
        match strategy {
            Strategy::CacheFirst => &self.config.static_partition,
            Strategy::NetworkFirst | Strategy::StaleWhileRevalidate => {
                &self.config.dynamic_partition
            }
        }
    }

    /// The other current partition, read when the network fails
    fn fallback_for(&self, strategy: Strategy) -> &str {
        match strategy {
            Strategy::CacheFirst => &self.config.dynamic_partition,
            Strategy::NetworkFirst | Strategy::StaleWhileRevalidate => {
                &self.config.static_partition
            }
        }
    }

    /// Background sync. There is no queue of offline actions to replay, so
    /// the known tag is only acknowledged.
    pub async fn on_sync(&self, tag: &str) -> bool {
        if tag == BACKGROUND_SYNC_TAG {
            info!(tag, "Background sync triggered");
            true
        } else {
            debug!(tag, "Ignoring unknown sync tag");
            false
        }
    }

    pub async fn on_push(
        &self,
        data: Option<&[u8]>,
        host: &dyn NotificationHost,
    ) -> Result<Option<Notification>> {
        self.notifications.on_push(data, host).await
    }

    pub async fn on_notification_click(
        &self,
        action: Option<&str>,
        data: Option<&str>,
        host: &dyn NotificationHost,
    ) -> Result<ClickOutcome> {
        self.notifications
            .on_notification_click(action, data, host)
            .await
    }
}
