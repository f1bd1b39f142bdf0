//! Durable client-side cache as a key/value blob store.
//!
//! Values are whole JSON documents. A write replaces the previous value
//! for the key; nothing is merged.

use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;

/// Key/value store holding serialized client state.
pub trait BlobStore {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Replace the value under `key`.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;
}

/// One file per key in a directory, created on first write.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FileBlobStore::new(tmp.path().join("cache"));

        assert_eq!(store.get("tasks").await.unwrap(), None);

        store.set("tasks", "{\"a\":1}").await.unwrap();
        store.set("tasks", "{\"a\":2}").await.unwrap();
        assert_eq!(store.get("tasks").await.unwrap().as_deref(), Some("{\"a\":2}"));
        assert!(tmp.path().join("cache/tasks.json").exists());
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        let store = MemoryBlobStore::new();
        let view = store.clone();

        store.set("k", "v").await.unwrap();
        assert_eq!(view.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(view.get("missing").await.unwrap(), None);
    }
}
