//! Named cache partitions and garbage collection of obsolete ones

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::CacheStorage;
use crate::types::Response;

/// Handle to one named partition
#[derive(Clone)]
pub struct Partition {
    name: String,
    storage: Arc<dyn CacheStorage>,
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Result<Option<Response>> {
        self.storage.get(&self.name, key).await
    }

    /// Last writer wins
    pub async fn put(&self, key: &str, response: Response) -> Result<()> {
        self.storage.put(&self.name, key, response).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.storage.delete(&self.name, key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.storage.keys(&self.name).await
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition").field("name", &self.name).finish()
    }
}

/// Opens, lists and deletes partitions on a storage backend
#[derive(Clone)]
pub struct CacheStoreManager {
    storage: Arc<dyn CacheStorage>,
}

impl CacheStoreManager {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Open a partition, creating it if absent. Idempotent.
    pub async fn open(&self, name: &str) -> Result<Partition> {
        self.storage.open(name).await?;
        Ok(self.handle(name))
    }

    /// Handle to a partition without touching storage; it is created on first write
    pub fn handle(&self, name: &str) -> Partition {
        Partition {
            name: name.to_string(),
            storage: self.storage.clone(),
        }
    }

    pub async fn list_partitions(&self) -> Result<Vec<String>> {
        self.storage.partitions().await
    }

    pub async fn delete(&self, name: &str) -> Result<bool> {
        self.storage.delete_partition(name).await
    }

    /// Delete every partition not named in `current`. Returns the deleted names.
    pub async fn purge_obsolete(&self, current: &[&str]) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.list_partitions().await? {
            if current.contains(&name.as_str()) {
                debug!(partition = %name, "Keeping current partition");
                continue;
            }
            info!(partition = %name, "Deleting obsolete partition");
            if self.delete(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCacheStorage;

    fn manager() -> CacheStoreManager {
        CacheStoreManager::new(Arc::new(MemoryCacheStorage::new()))
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let manager = manager();
        let first = manager.open("static-v1").await.unwrap();
        first.put("k", Response::new(200, "a")).await.unwrap();

        let second = manager.open("static-v1").await.unwrap();
        assert_eq!(second.name(), "static-v1");
        assert!(second.get("k").await.unwrap().is_some());
        assert_eq!(manager.list_partitions().await.unwrap(), vec!["static-v1"]);
    }

    #[tokio::test]
    async fn test_handle_creates_partition_lazily() {
        let manager = manager();
        let partition = manager.handle("dynamic-v1");
        assert!(manager.list_partitions().await.unwrap().is_empty());

        partition.put("k", Response::new(200, "a")).await.unwrap();
        assert_eq!(manager.list_partitions().await.unwrap(), vec!["dynamic-v1"]);
    }

    #[tokio::test]
    async fn test_purge_keeps_only_current() {
        let manager = manager();
        for name in [
            "static-v1",
            "dynamic-v1",
            "static-v2-current",
            "dynamic-v2-current",
        ] {
            manager.open(name).await.unwrap();
        }

        let deleted = manager
            .purge_obsolete(&["static-v2-current", "dynamic-v2-current"])
            .await
            .unwrap();

        assert_eq!(deleted, vec!["dynamic-v1", "static-v1"]);
        assert_eq!(
            manager.list_partitions().await.unwrap(),
            vec!["dynamic-v2-current", "static-v2-current"]
        );
    }

    #[tokio::test]
    async fn test_purge_with_nothing_obsolete() {
        let manager = manager();
        manager.open("static-v2").await.unwrap();
        let deleted = manager.purge_obsolete(&["static-v2", "dynamic-v2"]).await.unwrap();
        assert!(deleted.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_partition_loses_entries() {
        let manager = manager();
        let partition = manager.open("static-v1").await.unwrap();
        partition.put("k", Response::new(200, "a")).await.unwrap();

        assert!(manager.delete("static-v1").await.unwrap());
        assert!(partition.get("k").await.unwrap().is_none());
    }
}
