//! Storage backends for cache partitions
//!
//! [`CacheStorage`] is the capability the rest of the layer is written
//! against. A put or get on a single key is atomic; nothing else is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{OfflineCacheError, Result};
use crate::types::Response;

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the partition if it does not exist yet
    async fn open(&self, partition: &str) -> Result<()>;

    /// Names of all existing partitions
    async fn partitions(&self) -> Result<Vec<String>>;

    /// Delete a partition and every entry in it. Returns whether it existed.
    async fn delete_partition(&self, partition: &str) -> Result<bool>;

    async fn get(&self, partition: &str, key: &str) -> Result<Option<Response>>;

    /// Insert or overwrite an entry, creating the partition if needed
    async fn put(&self, partition: &str, key: &str, response: Response) -> Result<()>;

    async fn delete(&self, partition: &str, key: &str) -> Result<bool>;

    async fn keys(&self, partition: &str) -> Result<Vec<String>>;
}

/// Reject names that cannot be used as a single directory component
fn validate_partition_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(&['/', '\\', '\0'][..]);
    if invalid {
        return Err(OfflineCacheError::InvalidPartition(name.to_string()));
    }
    Ok(())
}

/// Process-local storage
#[derive(Default)]
pub struct MemoryCacheStorage {
    partitions: RwLock<BTreeMap<String, HashMap<String, Response>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, partition: &str) -> Result<()> {
        validate_partition_name(partition)?;
        let mut partitions = self.partitions.write().await;
        partitions.entry(partition.to_string()).or_default();
        Ok(())
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        let partitions = self.partitions.read().await;
        Ok(partitions.keys().cloned().collect())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions.remove(partition).is_some())
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<Response>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(partition)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, partition: &str, key: &str, response: Response) -> Result<()> {
        validate_partition_name(partition)?;
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .get_mut(partition)
            .is_some_and(|entries| entries.remove(key).is_some()))
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(partition)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// Everything about a stored entry except its body
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    status_text: String,
    headers: BTreeMap<String, String>,
    size: u64,
}

/// Durable storage: one directory per partition, each entry a metadata JSON
/// file plus a body file named by the sha256 of the request key
pub struct FileCacheStorage {
    root: PathBuf,
    /// Disambiguates temp files of concurrent writers
    write_seq: Arc<AtomicU64>,
}

impl FileCacheStorage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            write_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Ensure the root directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, "File cache storage initialized");
        Ok(())
    }

    /// File stem for a request key
    pub fn entry_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf> {
        validate_partition_name(partition)?;
        Ok(self.root.join(partition))
    }

    fn entry_paths(dir: &Path, key: &str) -> (PathBuf, PathBuf) {
        let name = Self::entry_name(key);
        (
            dir.join(format!("{}.json", name)),
            dir.join(format!("{}.body", name)),
        )
    }

    /// Write through a temp file so readers never see a partial file
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp{}", seq));
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_meta(path: &Path) -> Result<Option<EntryMeta>> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStorage for FileCacheStorage {
    async fn open(&self, partition: &str) -> Result<()> {
        let dir = self.partition_dir(partition)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        let dir = self.partition_dir(partition)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<Response>> {
        let dir = self.partition_dir(partition)?;
        let (meta_path, body_path) = Self::entry_paths(&dir, key);

        let Some(meta) = Self::read_meta(&meta_path).await? else {
            return Ok(None);
        };
        if meta.key != key {
            warn!(partition, key, stored = %meta.key, "Cache entry key mismatch");
            return Ok(None);
        }

        match fs::read(&body_path).await {
            Ok(body) => Ok(Some(Response {
                status: meta.status,
                status_text: meta.status_text,
                headers: meta.headers,
                body,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(partition, key, "Cache entry body missing, removing entry");
                let _ = fs::remove_file(&meta_path).await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, partition: &str, key: &str, response: Response) -> Result<()> {
        let dir = self.partition_dir(partition)?;
        fs::create_dir_all(&dir).await?;
        let (meta_path, body_path) = Self::entry_paths(&dir, key);

        let meta = EntryMeta {
            key: key.to_string(),
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            size: response.body.len() as u64,
        };

        // Body first: metadata is what makes the entry visible
        self.write_atomic(&body_path, &response.body).await?;
        self.write_atomic(&meta_path, &serde_json::to_vec(&meta)?)
            .await?;

        debug!(partition, key, size = meta.size, "Stored cache entry");
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool> {
        let dir = self.partition_dir(partition)?;
        let (meta_path, body_path) = Self::entry_paths(&dir, key);

        let existed = match fs::remove_file(&meta_path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let _ = fs::remove_file(&body_path).await;
        Ok(existed)
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>> {
        let dir = self.partition_dir(partition)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(meta) = Self::read_meta(&path).await? {
                keys.push(meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
