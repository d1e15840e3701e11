//! Per-address notification persistence.
//!
//! Data model:
//!   notifications_{lowercase address}  → JSON array of Notification, newest first
//!
//! Backends: a directory of JSON files, Valkey (Redis-compatible) keys under
//! a prefix, or process memory. Writes replace the whole bucket and are not
//! atomic.

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, StoreBackend};
use crate::notify::Notification;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("valkey error: {0}")]
    Valkey(#[from] redis::RedisError),
}

/// Bucket name for an address.
pub fn bucket_key(address: &Address) -> String {
    format!("notifications_{address:#x}")
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// A missing bucket loads as empty.
    async fn load(&self, address: &Address) -> Result<Vec<Notification>, StoreError>;
    async fn save(&self, address: &Address, notifications: &[Notification]) -> Result<(), StoreError>;
}

/// Open the backend selected in config.
pub async fn open(config: &Config) -> Result<Arc<dyn NotificationStore>, StoreError> {
    let store: Arc<dyn NotificationStore> = match config.notifications.backend {
        StoreBackend::File => Arc::new(FileStore::new(config.notifications.dir.clone()).await?),
        StoreBackend::Valkey => {
            Arc::new(ValkeyStore::connect(&config.valkey.url, &config.valkey.prefix).await?)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::default()),
    };
    Ok(store)
}

fn parse_bucket(address: &Address, json: &str) -> Result<Vec<Notification>, StoreError> {
    match serde_json::from_str(json) {
        Ok(list) => Ok(list),
        Err(e) => {
            warn!(address = %address, error = %e, "corrupt notification bucket");
            Err(e.into())
        }
    }
}

/// In-process store, mainly for tests and `memory` backend runs.
#[derive(Default)]
pub struct MemoryStore {
    buckets: DashMap<String, String>,
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn load(&self, address: &Address) -> Result<Vec<Notification>, StoreError> {
        match self.buckets.get(&bucket_key(address)) {
            Some(json) => parse_bucket(address, json.value()),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, address: &Address, notifications: &[Notification]) -> Result<(), StoreError> {
        let json = serde_json::to_string(notifications)?;
        self.buckets.insert(bucket_key(address), json);
        Ok(())
    }
}

/// One `<bucket>.json` file per address.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn new(dir: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "file notification store ready");
        Ok(Self { dir })
    }

    fn path(&self, address: &Address) -> PathBuf {
        self.dir.join(format!("{}.json", bucket_key(address)))
    }
}

#[async_trait]
impl NotificationStore for FileStore {
    async fn load(&self, address: &Address) -> Result<Vec<Notification>, StoreError> {
        match tokio::fs::read_to_string(self.path(address)).await {
            Ok(json) => parse_bucket(address, &json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, address: &Address, notifications: &[Notification]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(notifications)?;
        tokio::fs::write(self.path(address), json).await?;
        debug!(address = %address, count = notifications.len(), "notifications saved");
        Ok(())
    }
}

/// Valkey-backed store.
///
/// Keys are namespaced under a configurable prefix so several deployments can
/// share one Valkey: "secureflow" gives keys like
/// "secureflow:notifications_0xabc...".
#[derive(Clone)]
pub struct ValkeyStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl ValkeyStore {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let store = Self {
            conn,
            prefix: prefix.to_string(),
        };
        store.ping().await?;
        info!(url = url, prefix = prefix, "connected to Valkey");
        Ok(store)
    }

    /// Build a namespaced key: "{prefix}:{suffix}"
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(response = %pong, "Valkey ping");
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for ValkeyStore {
    async fn load(&self, address: &Address) -> Result<Vec<Notification>, StoreError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.key(&bucket_key(address))).await?;
        match json {
            Some(j) => parse_bucket(address, &j),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, address: &Address, notifications: &[Notification]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(notifications)?;
        conn.set::<_, _, ()>(self.key(&bucket_key(address)), json).await?;
        debug!(address = %address, count = notifications.len(), "notifications saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{escrow_notification, Details, EscrowAction};
    use alloy::primitives::address;
    use chrono::Utc;

    fn sample() -> Vec<Notification> {
        vec![escrow_notification(EscrowAction::Created, 1, Details::new()).into_notification(Utc::now())]
    }

    #[test]
    fn test_bucket_key_is_lowercase() {
        let a = address!("AbCdEf0000000000000000000000000000000001");
        assert_eq!(bucket_key(&a), "notifications_0xabcdef0000000000000000000000000000000001");
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::default();
        let who = Address::with_last_byte(1);
        assert!(store.load(&who).await.unwrap().is_empty());

        let list = sample();
        store.save(&who, &list).await.unwrap();
        assert_eq!(store.load(&who).await.unwrap(), list);
        assert!(store.load(&Address::with_last_byte(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested")).await.unwrap();
        let who = Address::with_last_byte(7);
        assert!(store.load(&who).await.unwrap().is_empty());

        let list = sample();
        store.save(&who, &list).await.unwrap();
        assert!(dir
            .path()
            .join("nested")
            .join(format!("{}.json", bucket_key(&who)))
            .exists());

        let reopened = FileStore::new(dir.path().join("nested")).await.unwrap();
        assert_eq!(reopened.load(&who).await.unwrap(), list);
    }

    #[tokio::test]
    async fn test_corrupt_bucket_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();
        let who = Address::with_last_byte(3);
        tokio::fs::write(store.path(&who), "{not json").await.unwrap();
        assert!(matches!(store.load(&who).await, Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn test_valkey_connect_fails_without_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("redis://127.0.0.1:{port}");
        assert!(matches!(
            ValkeyStore::connect(&url, "secureflow").await,
            Err(StoreError::Valkey(_))
        ));
    }
}
