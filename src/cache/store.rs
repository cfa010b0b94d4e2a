//! Storage and clock collaborators for the description cache.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::fs;

use crate::error::StoreError;
use crate::types::CacheEntry;

/// Persistence for cache entries keyed by authority
///
/// `save` must replace an entry as one unit: a reader sees either the old
/// entry or the new one, never a mix.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, authority: &str) -> Result<Option<CacheEntry>, StoreError>;

    async fn save(&self, authority: &str, entry: &CacheEntry) -> Result<(), StoreError>;

    async fn remove(&self, authority: &str) -> Result<(), StoreError>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self, authority: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.read().get(authority).cloned())
    }

    async fn save(&self, authority: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(authority.to_string(), entry.clone());
        Ok(())
    }

    async fn remove(&self, authority: &str) -> Result<(), StoreError> {
        self.entries.write().remove(authority);
        Ok(())
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store keeping one JSON file per authority: `{base}/{authority}.json`
///
/// Writes go to a temporary sibling file that is renamed over the target, so
/// an interrupted save never leaves a partial entry behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn entry_path(&self, authority: &str) -> Result<PathBuf, StoreError> {
        let valid = !authority.is_empty()
            && !authority.starts_with('.')
            && authority
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
        if !valid {
            return Err(StoreError::InvalidKey(authority.to_string()));
        }
        Ok(self.base_path.join(format!("{}.json", authority)))
    }

    fn temp_path(&self, authority: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.base_path
            .join(format!(".{}.{}.{}.tmp", authority, std::process::id(), n))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn load(&self, authority: &str) -> Result<Option<CacheEntry>, StoreError> {
        let path = self.entry_path(authority)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, authority: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let path = self.entry_path(authority)?;
        fs::create_dir_all(&self.base_path).await?;

        let bytes = serde_json::to_vec_pretty(entry)?;
        let temp = self.temp_path(authority);
        if let Err(e) = fs::write(&temp, &bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, authority: &str) -> Result<(), StoreError> {
        let path = self.entry_path(authority)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthorityEndpoint;
    use tempfile::tempdir;
    use url::Url;

    fn entry(authority: &str, document: &str) -> CacheEntry {
        CacheEntry {
            authority: authority.to_string(),
            endpoint: AuthorityEndpoint {
                authority: authority.to_string(),
                host: format!("lsid.{}", authority),
                port: 80,
                wsdl_url: Url::parse(&format!("http://lsid.{}/authority/", authority)).unwrap(),
            },
            document: document.to_string(),
            fetched_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load("ipni.org").await.unwrap().is_none());

        store.save("ipni.org", &entry("ipni.org", "<a/>")).await.unwrap();
        assert_eq!(store.load("ipni.org").await.unwrap().unwrap().document, "<a/>");

        store.remove("ipni.org").await.unwrap();
        assert!(store.load("ipni.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_save_and_load() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache"));

        assert!(store.load("nmbe.ch").await.unwrap().is_none());

        let saved = entry("nmbe.ch", "<definitions/>");
        store.save("nmbe.ch", &saved).await.unwrap();
        assert_eq!(store.load("nmbe.ch").await.unwrap(), Some(saved));
        assert!(dir.path().join("cache/nmbe.ch.json").exists());
    }

    #[tokio::test]
    async fn test_file_store_replace_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save("nmbe.ch", &entry("nmbe.ch", "old")).await.unwrap();
        store.save("nmbe.ch", &entry("nmbe.ch", "new")).await.unwrap();

        assert_eq!(store.load("nmbe.ch").await.unwrap().unwrap().document, "new");
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["nmbe.ch.json".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_remove() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save("nmbe.ch", &entry("nmbe.ch", "x")).await.unwrap();
        store.remove("nmbe.ch").await.unwrap();
        assert!(store.load("nmbe.ch").await.unwrap().is_none());

        // Removing a missing entry is not an error
        store.remove("nmbe.ch").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_keys() {
        let store = FileStore::new("/tmp/unused");
        for key in ["", "../etc", "a/b", ".hidden"] {
            assert!(matches!(
                store.load(key).await,
                Err(StoreError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_file_store_corrupt_entry() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::write(dir.path().join("nmbe.ch.json"), b"{ not json").unwrap();

        assert!(matches!(
            store.load("nmbe.ch").await,
            Err(StoreError::Json(_))
        ));
    }
}
