//! Offline asset caching layer
//!
//! Intercepts read requests issued by a page and resolves them from named,
//! versioned cache partitions or the network. Each request is classified by
//! URL and dispatched to one of three strategies: cache-first for static
//! assets, stale-while-revalidate for external font/CDN resources and
//! network-first for pages and anything unclassified.
//!
//! The storage backend, the network and the clock are injected, so the whole
//! layer runs unchanged against the in-memory store in tests and the file
//! store behind the proxy.

pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod notification;
pub mod partition;
pub mod policy;
pub mod storage;
pub mod strategy;
pub mod types;

pub use classify::{Classifier, ResourceClass};
pub use config::{NotificationConfig, OfflineCacheConfig, TtlTable};
pub use error::{OfflineCacheError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use lifecycle::{FetchOutcome, InstallReport, LifecycleController, LifecycleState};
pub use notification::{
    ClickOutcome, ClientWindow, Notification, NotificationAction, NotificationHooks,
    NotificationHost, PushPayload,
};
pub use partition::{CacheStoreManager, Partition};
pub use policy::{Clock, ExpirationPolicy, SystemClock};
pub use storage::{CacheStorage, FileCacheStorage, MemoryCacheStorage};
pub use strategy::{Resolution, ResponseSource, Strategy, StrategyContext};
pub use types::{CacheStats, Method, Request, Response, CACHED_AT_HEADER};
