//! Access to the per-user account document: credits, membership, and the
//! remote bookmark set.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lexy_common::{AccountDocument, Bookmark, BookmarkMutation, CreditAccount, Membership};
use tokio::sync::watch;
use tracing::debug;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Live view of the account's credit state.
    async fn subscribe(&self, email: &str) -> Result<watch::Receiver<CreditAccount>>;

    /// Decrement credits by one. Never goes below zero.
    async fn decrement_credit(&self, email: &str) -> Result<CreditAccount>;

    async fn bookmarks(&self, email: &str) -> Result<Vec<Bookmark>>;

    /// Add-to-set: a value equal to an existing element is not added again.
    async fn add_bookmark(&self, email: &str, bookmark: &Bookmark) -> Result<()>;

    /// Remove-from-set: removes elements exactly equal to `bookmark`.
    async fn remove_bookmark(&self, email: &str, bookmark: &Bookmark) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

struct MemoryEntry {
    account: CreditAccount,
    bookmarks: Vec<Bookmark>,
    tx: watch::Sender<CreditAccount>,
}

impl MemoryEntry {
    fn new(account: CreditAccount) -> Self {
        let (tx, _) = watch::channel(account);
        Self {
            account,
            bookmarks: Vec::new(),
            tx,
        }
    }

    fn publish(&self) {
        self.tx.send_replace(self.account);
    }
}

/// Account documents held in process; unseen emails get `default_account`.
pub struct MemoryAccountStore {
    default_account: CreditAccount,
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new(CreditAccount::new(10, Membership::Free))
    }
}

impl MemoryAccountStore {
    pub fn new(default_account: CreditAccount) -> Self {
        Self {
            default_account,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_account(self, email: &str, account: CreditAccount) -> Self {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(email.to_string(), MemoryEntry::new(account));
        self
    }

    /// Current value without subscribing.
    pub fn account(&self, email: &str) -> CreditAccount {
        self.with_entry(email, |entry| entry.account)
    }

    /// Replace the account, as an external upgrade or top-up would.
    pub fn set_account(&self, email: &str, account: CreditAccount) {
        self.with_entry(email, |entry| {
            entry.account = account;
            entry.publish();
        })
    }

    fn with_entry<R>(&self, email: &str, f: impl FnOnce(&mut MemoryEntry) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(email.to_string())
            .or_insert_with(|| MemoryEntry::new(self.default_account));
        f(entry)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn subscribe(&self, email: &str) -> Result<watch::Receiver<CreditAccount>> {
        Ok(self.with_entry(email, |entry| entry.tx.subscribe()))
    }

    async fn decrement_credit(&self, email: &str) -> Result<CreditAccount> {
        Ok(self.with_entry(email, |entry| {
            entry.account.credits = (entry.account.credits - 1).max(0);
            entry.publish();
            entry.account
        }))
    }

    async fn bookmarks(&self, email: &str) -> Result<Vec<Bookmark>> {
        Ok(self.with_entry(email, |entry| entry.bookmarks.clone()))
    }

    async fn add_bookmark(&self, email: &str, bookmark: &Bookmark) -> Result<()> {
        self.with_entry(email, |entry| {
            if !entry.bookmarks.contains(bookmark) {
                entry.bookmarks.push(bookmark.clone());
            }
        });
        Ok(())
    }

    async fn remove_bookmark(&self, email: &str, bookmark: &Bookmark) -> Result<()> {
        self.with_entry(email, |entry| entry.bookmarks.retain(|b| b != bookmark));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP (lexy-api `/api/users/{email}`)
// ---------------------------------------------------------------------------

pub struct HttpAccountStore {
    http: reqwest::Client,
    base_url: String,
    channels: Mutex<HashMap<String, watch::Sender<CreditAccount>>>,
}

impl HttpAccountStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn user_url(&self, email: &str) -> String {
        format!("{}/api/users/{}", self.base_url, urlencoding::encode(email))
    }

    /// Re-read the document and push it to subscribers.
    pub async fn refresh(&self, email: &str) -> Result<CreditAccount> {
        let doc: AccountDocument = self
            .http
            .get(self.user_url(email))
            .send()
            .await?
            .error_for_status()
            .context("Account fetch failed")?
            .json()
            .await
            .context("Malformed account document")?;
        self.publish(email, doc.account);
        Ok(doc.account)
    }

    fn publish(&self, email: &str, account: CreditAccount) -> watch::Receiver<CreditAccount> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let tx = channels
            .entry(email.to_string())
            .or_insert_with(|| watch::channel(account).0);
        tx.send_replace(account);
        tx.subscribe()
    }

    async fn mutate_bookmarks(&self, req: reqwest::RequestBuilder, bookmark: &Bookmark) -> Result<()> {
        req.json(&BookmarkMutation {
            bookmark: bookmark.clone(),
        })
        .send()
        .await?
        .error_for_status()
        .context("Bookmark update failed")?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for HttpAccountStore {
    async fn subscribe(&self, email: &str) -> Result<watch::Receiver<CreditAccount>> {
        let account = self.refresh(email).await?;
        Ok(self.publish(email, account))
    }

    async fn decrement_credit(&self, email: &str) -> Result<CreditAccount> {
        let doc: AccountDocument = self
            .http
            .post(format!("{}/credits/decrement", self.user_url(email)))
            .send()
            .await?
            .error_for_status()
            .context("Credit decrement failed")?
            .json()
            .await
            .context("Malformed account document")?;
        debug!(credits = doc.account.credits, "Credit decremented");
        self.publish(email, doc.account);
        Ok(doc.account)
    }

    async fn bookmarks(&self, email: &str) -> Result<Vec<Bookmark>> {
        let bookmarks = self
            .http
            .get(format!("{}/bookmarks", self.user_url(email)))
            .send()
            .await?
            .error_for_status()
            .context("Bookmark fetch failed")?
            .json()
            .await
            .context("Malformed bookmark list")?;
        Ok(bookmarks)
    }

    async fn add_bookmark(&self, email: &str, bookmark: &Bookmark) -> Result<()> {
        let req = self.http.post(format!("{}/bookmarks", self.user_url(email)));
        self.mutate_bookmarks(req, bookmark).await
    }

    async fn remove_bookmark(&self, email: &str, bookmark: &Bookmark) -> Result<()> {
        let req = self.http.delete(format!("{}/bookmarks", self.user_url(email)));
        self.mutate_bookmarks(req, bookmark).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bookmark(link: &str) -> Bookmark {
        Bookmark {
            title: "T".into(),
            link: link.into(),
            snippet: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn memory_decrement_floors_at_zero_and_notifies() {
        let store = MemoryAccountStore::default()
            .with_account("a@b.c", CreditAccount::new(1, Membership::Free));
        let mut rx = store.subscribe("a@b.c").await.unwrap();

        store.decrement_credit("a@b.c").await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().credits, 0);

        let after = store.decrement_credit("a@b.c").await.unwrap();
        assert_eq!(after.credits, 0);
    }

    #[tokio::test]
    async fn memory_bookmarks_are_a_set() {
        let store = MemoryAccountStore::default();
        let b = bookmark("https://x.example/1");
        store.add_bookmark("a@b.c", &b).await.unwrap();
        store.add_bookmark("a@b.c", &b).await.unwrap();
        assert_eq!(store.bookmarks("a@b.c").await.unwrap().len(), 1);

        store.remove_bookmark("a@b.c", &b).await.unwrap();
        assert!(store.bookmarks("a@b.c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unseen_email_gets_default_account() {
        let store = MemoryAccountStore::new(CreditAccount::new(5, Membership::Basic));
        assert_eq!(store.account("new@b.c").credits, 5);
    }

    #[tokio::test]
    async fn http_subscribe_and_decrement() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/a%40b.c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "email": "a@b.c", "credits": 2, "membership": "Free", "bookmarks": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/users/a%40b.c/credits/decrement"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "email": "a@b.c", "credits": 1, "membership": "Free", "bookmarks": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpAccountStore::new(server.uri());
        let rx = store.subscribe("a@b.c").await.unwrap();
        assert_eq!(rx.borrow().credits, 2);

        store.decrement_credit("a@b.c").await.unwrap();
        assert_eq!(rx.borrow().credits, 1);
    }

    #[tokio::test]
    async fn http_add_bookmark_sends_mutation_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/users/a%40b.c/bookmarks"))
            .and(body_partial_json(json!({"bookmark": {"link": "https://x.example/1"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpAccountStore::new(server.uri());
        store
            .add_bookmark("a@b.c", &bookmark("https://x.example/1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn http_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/a%40b.c/bookmarks"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = HttpAccountStore::new(server.uri());
        assert!(store.bookmarks("a@b.c").await.is_err());
    }
}
