//! Saved results behind one repository interface. Anonymous users keep
//! bookmarks in local storage; signed-in users keep them on the account
//! document with a local mirror for offline reads.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use lexy_common::{canonical_link, Bookmark, Post};
use tracing::warn;

use crate::account::AccountStore;
use crate::identity::Identity;
use crate::notice::{Notice, Notifier};
use crate::store::{keys, LocalStore, StorageKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadySaved,
}

/// Entries are identified by their decoded link.
#[async_trait]
pub trait BookmarkRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Bookmark>>;

    async fn add(&self, post: &Post) -> Result<AddOutcome>;

    /// Removes every entry with the same link. Returns how many were removed.
    async fn remove(&self, link: &str) -> Result<usize>;
}

/// Picks the backend for the current identity.
pub fn select_repository(
    identity: &Identity,
    store: LocalStore,
    accounts: Arc<dyn AccountStore>,
) -> Arc<dyn BookmarkRepository> {
    match identity.email() {
        Some(email) => Arc::new(RemoteBookmarks::new(accounts, email, store)),
        None => Arc::new(LocalBookmarks::anonymous(store)),
    }
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

pub struct LocalBookmarks {
    store: LocalStore,
    key: StorageKey<Vec<Bookmark>>,
}

impl LocalBookmarks {
    pub fn anonymous(store: LocalStore) -> Self {
        Self {
            store,
            key: StorageKey::fixed(keys::BOOKMARKS),
        }
    }
}

#[async_trait]
impl BookmarkRepository for LocalBookmarks {
    async fn list(&self) -> Result<Vec<Bookmark>> {
        Ok(self.store.get(&self.key).unwrap_or_default())
    }

    async fn add(&self, post: &Post) -> Result<AddOutcome> {
        let mut saved = self.list().await?;
        let key = canonical_link(&post.link);
        if saved.iter().any(|b| b.key() == key) {
            return Ok(AddOutcome::AlreadySaved);
        }
        saved.push(Bookmark::from_post(post, Utc::now()));
        self.store.set(&self.key, &saved)?;
        Ok(AddOutcome::Added)
    }

    async fn remove(&self, link: &str) -> Result<usize> {
        let mut saved = self.list().await?;
        let key = canonical_link(link);
        let before = saved.len();
        saved.retain(|b| b.key() != key);
        let removed = before - saved.len();
        if removed > 0 {
            self.store.set(&self.key, &saved)?;
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

pub struct RemoteBookmarks {
    accounts: Arc<dyn AccountStore>,
    email: String,
    store: LocalStore,
    mirror: StorageKey<Vec<Bookmark>>,
}

impl RemoteBookmarks {
    pub fn new(accounts: Arc<dyn AccountStore>, email: &str, store: LocalStore) -> Self {
        Self {
            accounts,
            email: email.to_string(),
            store,
            mirror: StorageKey::owned(keys::user_bookmarks(email)),
        }
    }

    fn write_mirror(&self, bookmarks: &Vec<Bookmark>) {
        if let Err(e) = self.store.set(&self.mirror, bookmarks) {
            warn!(error = %e, "Failed to mirror bookmarks locally");
        }
    }

    async fn fetch(&self) -> Result<Vec<Bookmark>> {
        let bookmarks = self.accounts.bookmarks(&self.email).await?;
        self.write_mirror(&bookmarks);
        Ok(bookmarks)
    }
}

#[async_trait]
impl BookmarkRepository for RemoteBookmarks {
    /// Falls back to the local mirror when the account store is unreachable.
    async fn list(&self) -> Result<Vec<Bookmark>> {
        match self.fetch().await {
            Ok(bookmarks) => Ok(bookmarks),
            Err(e) => match self.store.get(&self.mirror) {
                Some(cached) => {
                    warn!(error = %e, "Bookmark fetch failed, using local mirror");
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }

    async fn add(&self, post: &Post) -> Result<AddOutcome> {
        let key = canonical_link(&post.link);
        if self.fetch().await?.iter().any(|b| b.key() == key) {
            return Ok(AddOutcome::AlreadySaved);
        }
        self.accounts
            .add_bookmark(&self.email, &Bookmark::from_post(post, Utc::now()))
            .await?;
        self.fetch().await?;
        Ok(AddOutcome::Added)
    }

    async fn remove(&self, link: &str) -> Result<usize> {
        let key = canonical_link(link);
        let matching: Vec<Bookmark> = self
            .fetch()
            .await?
            .into_iter()
            .filter(|b| b.key() == key)
            .collect();
        // Remove-from-set matches whole values, so each stored entry goes
        // out as it was stored.
        for bookmark in &matching {
            self.accounts.remove_bookmark(&self.email, bookmark).await?;
        }
        if !matching.is_empty() {
            self.fetch().await?;
        }
        Ok(matching.len())
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Bookmark actions with user-facing notices.
pub struct BookmarkService {
    repo: Arc<dyn BookmarkRepository>,
    notifier: Arc<dyn Notifier>,
}

impl BookmarkService {
    pub fn new(repo: Arc<dyn BookmarkRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { repo, notifier }
    }

    pub async fn list(&self) -> Result<Vec<Bookmark>> {
        self.repo.list().await
    }

    pub async fn add(&self, post: &Post) -> Result<AddOutcome> {
        let outcome = self.repo.add(post).await?;
        self.notifier.notify(match outcome {
            AddOutcome::Added => Notice::success("Saved to bookmarks"),
            AddOutcome::AlreadySaved => Notice::info("Already in bookmarks"),
        });
        Ok(outcome)
    }

    pub async fn remove(&self, link: &str) -> Result<usize> {
        let removed = self.repo.remove(link).await?;
        if removed > 0 {
            self.notifier.notify(Notice::success("Removed from bookmarks"));
        }
        Ok(removed)
    }
}
