//! Bringing the offline cache up in the background
//!
//! The server starts serving pass-through traffic right away. Install and
//! activate are retried with exponential backoff until both succeed, so a
//! seed fetch that fails at boot does not leave the cache disabled for the
//! life of the process.

use offline_cache::{LifecycleController, LifecycleState, OfflineCacheError};
use std::time::Duration;
use tracing::{info, warn};

/// Install then activate, skipping whichever step already happened
async fn bring_up(controller: &LifecycleController) -> Result<(), OfflineCacheError> {
    if controller.state() == LifecycleState::Uninstalled {
        controller.install().await?;
    }
    if controller.state() == LifecycleState::Installed {
        controller.activate().await?;
    }
    Ok(())
}

/// Retry install and activate until the controller is active.
/// Returns the number of attempts it took.
pub async fn install_until_active(
    controller: &LifecycleController,
    initial_delay: Duration,
    max_delay: Duration,
) -> u32 {
    let mut delay = initial_delay;
    let mut attempt = 1;

    loop {
        match bring_up(controller).await {
            Ok(()) => {
                info!(attempt, "Offline cache is active");
                return attempt;
            }
            Err(e) => {
                warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Offline cache bring-up failed, serving pass-through until retry"
                );
            }
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(max_delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use offline_cache::{
        Fetcher, MemoryCacheStorage, OfflineCacheConfig, Request, Response as CachedResponse,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use url::Url;

    /// Origin that is unreachable until brought back up
    #[derive(Default)]
    struct FlakyFetcher {
        down: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for FlakyFetcher {
        async fn fetch(&self, request: &Request) -> offline_cache::Result<CachedResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(OfflineCacheError::Network("connection refused".to_string()));
            }
            Ok(CachedResponse::new(200, request.url.path().to_string()))
        }
    }

    fn controller(fetcher: Arc<FlakyFetcher>) -> Arc<LifecycleController> {
        let config = OfflineCacheConfig::new(Url::parse("https://olabiba.example").unwrap());
        Arc::new(LifecycleController::new(
            config,
            Arc::new(MemoryCacheStorage::new()),
            fetcher,
        ))
    }

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let controller = controller(Arc::new(FlakyFetcher::default()));

        let attempts =
            install_until_active(&controller, Duration::from_millis(10), Duration::from_millis(10))
                .await;

        assert_eq!(attempts, 1);
        assert_eq!(controller.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_failed_install_is_retried_until_active() {
        let fetcher = Arc::new(FlakyFetcher::default());
        fetcher.down.store(true, Ordering::SeqCst);
        let controller = controller(fetcher.clone());

        let task = tokio::spawn({
            let controller = controller.clone();
            async move {
                install_until_active(
                    &controller,
                    Duration::from_millis(10),
                    Duration::from_millis(20),
                )
                .await
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fetcher.calls.load(Ordering::SeqCst) > 0);
        assert_eq!(controller.state(), LifecycleState::Uninstalled);

        fetcher.down.store(false, Ordering::SeqCst);
        let attempts = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("bring-up should finish once the origin is back")
            .unwrap();

        assert!(attempts > 1);
        assert_eq!(controller.state(), LifecycleState::Active);
        assert!(controller.skip_waiting_requested());
        assert!(controller.clients_claimed());
    }

    #[tokio::test]
    async fn test_already_active_controller_is_left_alone() {
        let fetcher = Arc::new(FlakyFetcher::default());
        let controller = controller(fetcher.clone());
        controller.install().await.unwrap();
        controller.activate().await.unwrap();
        let calls = fetcher.calls.load(Ordering::SeqCst);

        let attempts =
            install_until_active(&controller, Duration::from_millis(10), Duration::from_millis(10))
                .await;

        assert_eq!(attempts, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), calls);
    }
}
