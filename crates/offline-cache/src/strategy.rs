//! Fetch-resolution strategies
//!
//! Every strategy resolves a request against one partition and always
//! produces a response: when neither network nor cache can answer, the
//! result is a synthesized 503. Strategies never chain into each other.
//!
//! When the network fails, cache-first and network-first fall back to an
//! entry from the designated partition first and then from the fallback
//! partitions in order, so seeded entries stay reachable whichever
//! partition they were written to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::classify::ResourceClass;
use crate::error::{OfflineCacheError, Result};
use crate::fetch::Fetcher;
use crate::partition::Partition;
use crate::policy::{Clock, ExpirationPolicy};
use crate::types::{CacheStats, Request, Response};

pub const ASSET_UNAVAILABLE: &str = "Offline - Asset not available";
pub const PAGE_UNAVAILABLE: &str = "Offline - Page not available";
pub const RESOURCE_UNAVAILABLE: &str = "Offline - Resource not available";

/// Where a resolved response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Cached entry served on the fast path
    Cache,
    Network,
    /// Cached entry served because the network failed
    StaleCache,
    /// Synthesized 503
    Offline,
}

impl ResponseSource {
    /// Value for an `X-Cache` style diagnostic header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "HIT",
            ResponseSource::Network => "MISS",
            ResponseSource::StaleCache => "STALE",
            ResponseSource::Offline => "OFFLINE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub response: Response,
    pub source: ResponseSource,
}

impl Resolution {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    /// Strategy used for a resource class. Anything without a dedicated
    /// strategy gets network-first.
    pub fn for_class(class: ResourceClass) -> Self {
        match class {
            ResourceClass::StaticAsset | ResourceClass::Image => Strategy::CacheFirst,
            ResourceClass::ExternalResource => Strategy::StaleWhileRevalidate,
            ResourceClass::HtmlPage | ResourceClass::Other => Strategy::NetworkFirst,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }

    /// Body of the synthesized 503 for this strategy
    pub fn offline_message(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => ASSET_UNAVAILABLE,
            Strategy::NetworkFirst => PAGE_UNAVAILABLE,
            Strategy::StaleWhileRevalidate => RESOURCE_UNAVAILABLE,
        }
    }

    /// Resolve a request against `partition`, reading `fallback` only when
    /// the network fails. Never fails.
    pub async fn resolve(
        &self,
        ctx: &StrategyContext,
        request: &Request,
        class: ResourceClass,
        partition: &Partition,
        fallback: &[Partition],
    ) -> Resolution {
        let outcome = match self {
            Strategy::CacheFirst => {
                Ok(cache_first(ctx, request, class, partition, fallback).await)
            }
            Strategy::NetworkFirst => Ok(network_first(ctx, request, partition, fallback).await),
            Strategy::StaleWhileRevalidate => {
                stale_while_revalidate(ctx, request, partition).await
            }
        };

        outcome.unwrap_or_else(|e| {
            warn!(url = %request.url, strategy = self.as_str(), error = %e, "Strategy failed");
            ctx.offline(self.offline_message())
        })
    }
}

#[derive(Default)]
struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    offline: AtomicU64,
    revalidations: AtomicU64,
    revalidation_failures: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            offline: self.offline.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            revalidation_failures: self.revalidation_failures.load(Ordering::Relaxed),
        }
    }
}

/// Collaborators shared by all strategies
#[derive(Clone)]
pub struct StrategyContext {
    fetcher: Arc<dyn Fetcher>,
    policy: ExpirationPolicy,
    clock: Arc<dyn Clock>,
    background: TaskTracker,
    settling: Arc<Mutex<()>>,
    stats: Arc<StatsCounters>,
}

impl StrategyContext {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: ExpirationPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            policy,
            clock,
            background: TaskTracker::new(),
            settling: Arc::new(Mutex::new(())),
            stats: Arc::new(StatsCounters::default()),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.policy
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Number of background revalidations still running
    pub fn pending_revalidations(&self) -> usize {
        self.background.len()
    }

    /// Wait for every background revalidation spawned so far to finish.
    /// Responses never wait on this; it exists for shutdown and tests.
    /// Concurrent callers are serialized so one caller's reopen cannot
    /// strand another that is still waiting on the closed tracker.
    pub async fn settle(&self) {
        let _guard = self.settling.lock().await;
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    fn offline(&self, message: &str) -> Resolution {
        StatsCounters::bump(&self.stats.offline);
        Resolution::new(Response::offline(message), ResponseSource::Offline)
    }

    /// Fetch in a detached task that refreshes the partition on success.
    /// Failures are logged; the handle may be dropped.
    fn spawn_revalidation(&self, request: Request, partition: Partition) -> JoinHandle<Result<Response>> {
        let fetcher = self.fetcher.clone();
        let clock = self.clock.clone();
        let stats = self.stats.clone();

        self.background.spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) => {
                    StatsCounters::bump(&stats.revalidations);
                    if response.is_ok() {
                        store(&partition, &request, response.stamped(clock.now())).await;
                    }
                    Ok(response)
                }
                Err(e) => {
                    StatsCounters::bump(&stats.revalidation_failures);
                    warn!(url = %request.url, error = %e, "Background revalidation failed");
                    Err(e)
                }
            }
        })
    }
}

/// Storage errors on lookup count as a miss
async fn lookup(partition: &Partition, request: &Request) -> Option<Response> {
    match partition.get(request.cache_key()).await {
        Ok(entry) => entry,
        Err(e) => {
            warn!(url = %request.url, partition = partition.name(), error = %e, "Cache lookup failed");
            None
        }
    }
}

/// First entry for the request among `partitions`
async fn lookup_any(partitions: &[Partition], request: &Request) -> Option<Response> {
    for partition in partitions {
        if let Some(entry) = lookup(partition, request).await {
            debug!(url = %request.url, partition = partition.name(), "Fallback entry found");
            return Some(entry);
        }
    }
    None
}

/// Storage errors on write are logged; the response is still served
async fn store(partition: &Partition, request: &Request, response: Response) {
    if let Err(e) = partition.put(request.cache_key(), response).await {
        warn!(url = %request.url, partition = partition.name(), error = %e, "Cache write failed");
    }
}

async fn cache_first(
    ctx: &StrategyContext,
    request: &Request,
    class: ResourceClass,
    partition: &Partition,
    fallback: &[Partition],
) -> Resolution {
    let cached = lookup(partition, request).await;

    if let Some(entry) = &cached {
        if ctx.policy.is_fresh(entry, class, ctx.clock.now()) {
            StatsCounters::bump(&ctx.stats.hits);
            debug!(url = %request.url, "Cache hit");
            return Resolution::new(entry.clone(), ResponseSource::Cache);
        }
        debug!(url = %request.url, "Cached entry expired");
    }
    StatsCounters::bump(&ctx.stats.misses);

    match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            if response.is_ok() {
                store(partition, request, response.stamped(ctx.clock.now())).await;
            }
            Resolution::new(response, ResponseSource::Network)
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "Cache-first network fetch failed");
            let stale = match cached {
                Some(entry) => Some(entry),
                None => lookup_any(fallback, request).await,
            };
            match stale {
                Some(stale) => {
                    StatsCounters::bump(&ctx.stats.stale_served);
                    Resolution::new(stale, ResponseSource::StaleCache)
                }
                None => ctx.offline(ASSET_UNAVAILABLE),
            }
        }
    }
}

async fn network_first(
    ctx: &StrategyContext,
    request: &Request,
    partition: &Partition,
    fallback: &[Partition],
) -> Resolution {
    match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            if response.is_ok() {
                store(partition, request, response.stamped(ctx.clock.now())).await;
            }
            Resolution::new(response, ResponseSource::Network)
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "Network-first fetch failed");
            let cached = match lookup(partition, request).await {
                Some(entry) => Some(entry),
                None => lookup_any(fallback, request).await,
            };
            match cached {
                Some(cached) => {
                    StatsCounters::bump(&ctx.stats.stale_served);
                    Resolution::new(cached, ResponseSource::StaleCache)
                }
                None => ctx.offline(PAGE_UNAVAILABLE),
            }
        }
    }
}

async fn stale_while_revalidate(
    ctx: &StrategyContext,
    request: &Request,
    partition: &Partition,
) -> Result<Resolution> {
    let cached = lookup(partition, request).await;
    let revalidation = ctx.spawn_revalidation(request.clone(), partition.clone());

    if let Some(entry) = cached {
        StatsCounters::bump(&ctx.stats.hits);
        return Ok(Resolution::new(entry, ResponseSource::Cache));
    }

    StatsCounters::bump(&ctx.stats.misses);
    let response = revalidation
        .await
        .map_err(|e| OfflineCacheError::Network(e.to_string()))??;
    Ok(Resolution::new(response, ResponseSource::Network))
}
