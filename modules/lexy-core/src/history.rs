use lexy_common::HistoryEntry;
use serde::Deserialize;

use crate::error::StoreError;
use crate::store::{keys, LocalStore, StorageKey};

/// Older clients stored a single entry object rather than a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredHistory {
    List(Vec<HistoryEntry>),
    Single(HistoryEntry),
}

impl StoredHistory {
    fn into_entries(self) -> Vec<HistoryEntry> {
        match self {
            StoredHistory::List(entries) => entries,
            StoredHistory::Single(entry) => vec![entry],
        }
    }
}

const RAW_KEY: StorageKey<StoredHistory> = StorageKey::fixed(keys::HISTORY);
const KEY: StorageKey<Vec<HistoryEntry>> = StorageKey::fixed(keys::HISTORY);

/// Most-recent-first list of past searches under the `history` key.
#[derive(Clone)]
pub struct HistoryLog {
    store: LocalStore,
    limit: usize,
}

impl HistoryLog {
    pub fn new(store: LocalStore, limit: usize) -> Self {
        Self {
            store,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Newest first. An entry with the same title replaces the older one.
    pub fn append(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut entries = self.entries();
        entries.retain(|e| e.title != entry.title);
        entries.insert(0, entry);
        entries.truncate(self.limit);
        self.store.set(&KEY, &entries)
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.store
            .get(&RAW_KEY)
            .map(StoredHistory::into_entries)
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Option<HistoryEntry> {
        self.entries().into_iter().next()
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(&KEY)
    }
}
