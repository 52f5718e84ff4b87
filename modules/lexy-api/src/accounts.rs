//! In-memory `users/{email}` documents.

use std::collections::HashMap;

use lexy_common::{AccountDocument, Bookmark, CreditAccount, Membership};
use tokio::sync::RwLock;
use tracing::info;

pub struct AccountBook {
    docs: RwLock<HashMap<String, AccountDocument>>,
    default_credits: i64,
}

impl AccountBook {
    pub fn new(default_credits: i64) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            default_credits,
        }
    }

    fn fresh(&self, email: &str) -> AccountDocument {
        info!(email, credits = self.default_credits, "Creating account document");
        AccountDocument {
            email: email.to_string(),
            account: CreditAccount::new(self.default_credits, Membership::Free),
            bookmarks: Vec::new(),
        }
    }

    /// Returns the document, creating it on first sight.
    pub async fn get(&self, email: &str) -> AccountDocument {
        if let Some(doc) = self.docs.read().await.get(email) {
            return doc.clone();
        }
        let mut docs = self.docs.write().await;
        docs.entry(email.to_string())
            .or_insert_with(|| self.fresh(email))
            .clone()
    }

    /// Decrement by one, never below zero.
    pub async fn decrement_credit(&self, email: &str) -> AccountDocument {
        let mut docs = self.docs.write().await;
        let doc = docs
            .entry(email.to_string())
            .or_insert_with(|| self.fresh(email));
        doc.account.credits = (doc.account.credits - 1).max(0);
        doc.clone()
    }

    pub async fn bookmarks(&self, email: &str) -> Vec<Bookmark> {
        self.get(email).await.bookmarks
    }

    /// Add-to-set: an identical entry is not stored twice.
    pub async fn add_bookmark(&self, email: &str, bookmark: Bookmark) -> Vec<Bookmark> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .entry(email.to_string())
            .or_insert_with(|| self.fresh(email));
        if !doc.bookmarks.contains(&bookmark) {
            doc.bookmarks.push(bookmark);
        }
        doc.bookmarks.clone()
    }

    /// Remove-from-set: drops entries equal to `bookmark`.
    pub async fn remove_bookmark(&self, email: &str, bookmark: &Bookmark) -> Vec<Bookmark> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .entry(email.to_string())
            .or_insert_with(|| self.fresh(email));
        doc.bookmarks.retain(|b| b != bookmark);
        doc.bookmarks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bookmark(link: &str) -> Bookmark {
        Bookmark {
            title: "T".into(),
            link: link.into(),
            snippet: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn new_accounts_start_free_with_default_credits() {
        let book = AccountBook::new(7);
        let doc = book.get("a@b.c").await;
        assert_eq!(doc.account, CreditAccount::new(7, Membership::Free));
        assert!(doc.bookmarks.is_empty());
    }

    #[tokio::test]
    async fn decrement_floors_at_zero() {
        let book = AccountBook::new(1);
        assert_eq!(book.decrement_credit("a@b.c").await.account.credits, 0);
        assert_eq!(book.decrement_credit("a@b.c").await.account.credits, 0);
    }

    #[tokio::test]
    async fn bookmarks_behave_as_a_set() {
        let book = AccountBook::new(1);
        book.add_bookmark("a@b.c", bookmark("https://x.example/1")).await;
        let saved = book.add_bookmark("a@b.c", bookmark("https://x.example/1")).await;
        assert_eq!(saved.len(), 1);

        book.add_bookmark("a@b.c", bookmark("https://x.example/2")).await;
        let left = book.remove_bookmark("a@b.c", &bookmark("https://x.example/1")).await;
        assert_eq!(left, vec![bookmark("https://x.example/2")]);
    }
}
