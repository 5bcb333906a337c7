//! The durable-storage boundary.
//!
//! Per the design, the host's isolation/sandbox runtime owns the actual
//! persistence primitive; this crate only depends on its interface. Each
//! component holds a [`DurableStore`] and reads/writes a small number of
//! named records under it, so that on restart every component can rebuild
//! its state purely from persisted bytes (no cross-component keys, no
//! shared namespace).
//!
//! [`InMemoryStore`] and [`FileStore`] are provided for local development and
//! tests; a host embedding this wallet inside a real sandbox substitutes its
//! own implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{WalletError, WalletResult};

/// Async key-value contract for durable persistence.
///
/// Keys are opaque strings chosen by the calling component (e.g.
/// `"keyholder:state"`, `"authority:delegations"`). Values are raw bytes;
/// components serialize their own records (typically as JSON) before
/// calling [`DurableStore::put_bytes`].
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get_bytes(&self, key: &str) -> WalletResult<Option<Vec<u8>>>;
    async fn put_bytes(&self, key: &str, value: Vec<u8>) -> WalletResult<()>;
    async fn delete(&self, key: &str) -> WalletResult<()>;
}

/// In-memory [`DurableStore`]. Nothing survives process restart; useful for
/// tests and for ephemeral/bootstrap scenarios.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get_bytes(&self, key: &str) -> WalletResult<Option<Vec<u8>>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put_bytes(&self, key: &str, value: Vec<u8>) -> WalletResult<()> {
        self.inner.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> WalletResult<()> {
        self.inner.write().await.remove(key);
        Ok(())
    }
}

/// A [`DurableStore`] backed by one JSON file per key under a base
/// directory. Not a production storage backend -- a real deployment
/// persists through the host isolation runtime's own primitive -- but handy
/// for local tooling and integration tests that need a restart to actually
/// observe rehydration.
pub struct FileStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            lock: RwLock::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe_name: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{safe_name}.json"))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get_bytes(&self, key: &str) -> WalletResult<Option<Vec<u8>>> {
        let _guard = self.lock.read().await;
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WalletError::ConfigurationInvalid(format!(
                "reading {}: {e}",
                path.display()
            ))),
        }
    }

    async fn put_bytes(&self, key: &str, value: Vec<u8>) -> WalletResult<()> {
        let _guard = self.lock.write().await;
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| WalletError::ConfigurationInvalid(format!("creating storage dir: {e}")))?;
        let path = self.path_for(key);
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| WalletError::ConfigurationInvalid(format!("writing {}: {e}", path.display())))
    }

    async fn delete(&self, key: &str) -> WalletResult<()> {
        let _guard = self.lock.write().await;
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }
}
