// Key-value persistence for the activity log — §4.H `[FULL]`.
//
// Grounded on `file_storage.rs`'s persistence idiom (an in-memory index
// guarded by a lock, one file per record on disk) rather than a NATS
// JetStream KV bucket, since the durable event bus itself is an
// out-of-scope external collaborator per §1 — only the key/value shape
// it exposes (`get`/`put`/`delete`/prefix scan/full key listing) matters
// to this crate.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// The minimal key-value contract the activity log and its migration
/// pass need. Keys are opaque strings; values are opaque bytes (msgpack
/// or JSON per §4.H's decode-tolerance rule).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// All keys starting with `prefix`, in no particular order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
    /// Every key in the store — used only by the one-time migration pass.
    async fn all_keys(&self) -> Result<Vec<String>>;
}

/// An in-memory store, used in tests and as the default when no
/// persistence directory is configured.
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn all_keys(&self) -> Result<Vec<String>> {
        Ok(self.data.read().await.keys().cloned().collect())
    }
}

/// A file-backed store: one file per key under `root`, named by the
/// hex encoding of the key so composite keys (which contain `.` and
/// arbitrary base32 text) never collide with filesystem restrictions.
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub async fn open(root: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key.as_bytes()))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let all = self.all_keys().await?;
        Ok(all.into_iter().filter(|k| k.starts_with(prefix)).collect())
    }

    async fn all_keys(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Ok(bytes) = hex::decode(name) {
                if let Ok(key) = String::from_utf8(bytes) {
                    out.push(key);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_roundtrip_and_prefix_scan() {
        let store = InMemoryStore::new();
        store.put("abc.1.10", b"one".to_vec()).await.unwrap();
        store.put("abc.2.20", b"two".to_vec()).await.unwrap();
        store.put("xyz.1.5", b"other".to_vec()).await.unwrap();

        let mut keys = store.keys_with_prefix("abc.").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["abc.1.10".to_string(), "abc.2.20".to_string()]);

        store.delete("abc.1.10").await.unwrap();
        assert!(store.get("abc.1.10").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileKeyValueStore::open(dir.path().to_path_buf()).await.unwrap();
            store.put("k.1.1", b"v".to_vec()).await.unwrap();
        }
        let store = FileKeyValueStore::open(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(store.get("k.1.1").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.all_keys().await.unwrap(), vec!["k.1.1".to_string()]);
    }
}
