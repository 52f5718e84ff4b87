use std::sync::{Arc, Mutex};

use chrono::Utc;
use lexy_common::{HistoryEntry, Post, SearchData, SearchRequest};
use tracing::{debug, info, warn};

use crate::backend::LexyBackend;
use crate::credits::CreditGate;
use crate::error::GateDenial;
use crate::generation::RequestGeneration;
use crate::history::HistoryLog;
use crate::store::{keys, LocalStore, StorageKey};

pub const SEARCH_DATA: StorageKey<SearchData> = StorageKey::fixed(keys::SEARCH_DATA);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Results of the latest search. Empty on any transport failure.
    Results(Vec<Post>),
    /// Stopped by the credit gate before any network call.
    Blocked(GateDenial),
    /// A newer search was issued while this one was in flight.
    Superseded,
}

impl SearchOutcome {
    pub fn into_posts(self) -> Vec<Post> {
        match self {
            SearchOutcome::Results(posts) => posts,
            _ => Vec::new(),
        }
    }
}

/// Runs searches and owns the `searchData` and `history` keys.
pub struct ResultFetcher {
    backend: Arc<dyn LexyBackend>,
    gate: Arc<CreditGate>,
    store: LocalStore,
    history: HistoryLog,
    generation: RequestGeneration,
    // Held from the staleness check through every shared-state write.
    commit_lock: Mutex<()>,
}

impl ResultFetcher {
    pub fn new(
        backend: Arc<dyn LexyBackend>,
        gate: Arc<CreditGate>,
        store: LocalStore,
        history: HistoryLog,
    ) -> Self {
        Self {
            backend,
            gate,
            store,
            history,
            generation: RequestGeneration::new(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// The snapshot written by the last committed search.
    pub fn cached(&self) -> Option<SearchData> {
        self.store.get(&SEARCH_DATA)
    }

    /// Fails open: transport errors and `{success:false}` bodies yield an
    /// empty result list, never an error.
    pub async fn search(&self, query: &str, page_size: usize) -> SearchOutcome {
        self.search_then(query, page_size, |_| {}).await
    }

    /// Like [`search`](Self::search), but `on_commit` runs with the result
    /// list only if this search is still the latest, atomically with the
    /// cache and history writes. Superseded searches never call it.
    pub async fn search_then<F>(&self, query: &str, page_size: usize, on_commit: F) -> SearchOutcome
    where
        F: FnOnce(&[Post]) + Send,
    {
        if let Err(denial) = self.gate.check() {
            return SearchOutcome::Blocked(denial);
        }

        let token = self.generation.next();
        let req = SearchRequest {
            query: query.to_string(),
            num: u32::try_from(page_size).unwrap_or(u32::MAX),
        };
        let result = self.backend.search(&req).await;

        let posts = {
            let _guard = self.commit_lock.lock().unwrap_or_else(|e| e.into_inner());
            if !token.is_current() {
                debug!(query, token = token.id(), "Discarding superseded search response");
                return SearchOutcome::Superseded;
            }

            match result {
                Ok(resp) if resp.success => {
                    info!(query, count = resp.data.len(), "Search complete");
                    self.commit(query, &resp.data);
                    on_commit(&resp.data);
                    resp.data
                }
                Ok(resp) => {
                    warn!(query, error = resp.error.as_deref().unwrap_or("unknown"), "Search returned failure");
                    on_commit(&[]);
                    return SearchOutcome::Results(Vec::new());
                }
                Err(e) => {
                    warn!(query, error = %e, "Search request failed");
                    on_commit(&[]);
                    return SearchOutcome::Results(Vec::new());
                }
            }
        };

        // Charged after every shared write; a newer search may start meanwhile.
        self.gate.consume().await;
        SearchOutcome::Results(posts)
    }

    fn commit(&self, query: &str, posts: &[Post]) {
        let snapshot = SearchData {
            query: query.to_string(),
            results: posts.to_vec(),
            fetched_at: Utc::now(),
        };
        if let Err(e) = self.store.set(&SEARCH_DATA, &snapshot) {
            warn!(error = %e, "Failed to cache search results");
        }
        let entry = HistoryEntry {
            title: query.to_string(),
            data: posts.to_vec(),
        };
        if let Err(e) = self.history.append(entry) {
            warn!(error = %e, "Failed to record search history");
        }
    }
}
