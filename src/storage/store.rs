use crate::error::StorageError;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// A string key-value store backing one storage tier
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store name used in logs and errors
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local map, optionally bounded to simulate quota limits
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    entries: Mutex<HashMap<String, String>>,
    max_entries: Option<usize>,
}

impl MemoryStore {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
            max_entries: None,
        }
    }

    /// Store that rejects new keys once `max_entries` are held
    pub fn with_quota<S: Into<String>>(name: S, max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Self::new(name)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Infallible accessors for callers that hold the concrete type
    pub fn read(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn write(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if let Some(max) = self.max_entries {
            if !entries.contains_key(key) && entries.len() >= max {
                return Err(StorageError::operation(&self.name, "quota exceeded"));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.delete(key);
        Ok(())
    }
}

/// Durable store persisting all keys as one JSON object on disk.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileStore {
    name: String,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            name: "durable".to_string(),
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StorageError::operation(&self.name, e)),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
            store: self.name.clone(),
            details: format!("{}: {}", self.path.display(), e),
        })
    }

    /// Entries to rewrite, and whether a corrupt file was discarded to get them.
    /// Discarding keeps the tier accepting writes.
    async fn load_for_write(&self) -> Result<(BTreeMap<String, String>, bool), StorageError> {
        match self.load().await {
            Ok(entries) => Ok((entries, false)),
            Err(StorageError::Corrupt { details, .. }) => {
                warn!("Discarding corrupt store file {}", details);
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::operation(&self.name, e))?;
        }

        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::operation(&self.name, e))?;

        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        fs::write(&tmp_path, content)
            .await
            .map_err(|e| StorageError::operation(&self.name, e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StorageError::operation(&self.name, e))?;

        debug!("Persisted {} keys to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let (mut entries, _) = self.load_for_write().await?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let (mut entries, discarded) = self.load_for_write().await?;
        if entries.remove(key).is_some() || discarded {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

/// Store for a tier the platform does not provide. Every operation fails.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    name: String,
}

impl UnavailableStore {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl KeyValueStore for UnavailableStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::unavailable(&self.name))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::unavailable(&self.name))
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::unavailable(&self.name))
    }
}
