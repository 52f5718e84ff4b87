//! Client-local key-value storage.
//!
//! Values are JSON strings under well-known keys, the same shape a browser
//! keeps in `localStorage`. Each key has exactly one writing component:
//!
//! - `bookmarks`            → `LocalBookmarks`
//! - `bookmarks-{userId}`   → `RemoteBookmarks` (offline mirror)
//! - `searchData`, `history` → `ResultFetcher` / `HistoryLog`
//! - `credits`              → `CreditGate` (anonymous counter)

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::StoreError;

pub mod keys {
    pub const BOOKMARKS: &str = "bookmarks";
    pub const SEARCH_DATA: &str = "searchData";
    pub const HISTORY: &str = "history";
    pub const ANON_CREDITS: &str = "credits";

    pub fn user_bookmarks(user_id: &str) -> String {
        format!("bookmarks-{user_id}")
    }
}

const CHANGE_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Raw backends
// ---------------------------------------------------------------------------

pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// Single JSON object on disk mapping key → value string.
/// Every write rewrites the file through a temp file + rename.
pub struct FileKv {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable storage file, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KvBackend for FileKv {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed access
// ---------------------------------------------------------------------------

/// A key name bound to the type stored under it.
pub struct StorageKey<T> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StorageKey<T> {
    pub const fn fixed(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    pub fn owned(name: String) -> Self {
        Self {
            name: Cow::Owned(name),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for StorageKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

/// Typed view over a [`KvBackend`] with change notifications.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KvBackend>,
    changes: broadcast::Sender<String>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { backend, changes }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    /// Read and decode a value. Malformed values are logged and read as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &StorageKey<T>) -> Option<T> {
        let raw = self.backend.get(key.name())?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key.name(), error = %e, "Discarding malformed stored value");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &StorageKey<T>, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key.name(), raw)?;
        let _ = self.changes.send(key.name().to_string());
        Ok(())
    }

    pub fn remove<T>(&self, key: &StorageKey<T>) -> Result<(), StoreError> {
        self.backend.remove(key.name())?;
        let _ = self.changes.send(key.name().to_string());
        Ok(())
    }

    /// Receives the name of every key written after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
