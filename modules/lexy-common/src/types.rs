use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LexyError;
use crate::links::{canonical_link, same_link};

// --- Search results ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Image,
}

/// Embeddable enrichment attached to results known to carry media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A single search result. `link` is the identity within a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
}

impl Post {
    pub fn new(title: impl Into<String>, link: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            snippet: snippet.into(),
            media: None,
        }
    }

    /// The link decoded for display and navigation.
    pub fn display_link(&self) -> String {
        canonical_link(&self.link)
    }

    pub fn is_same_result(&self, other: &Post) -> bool {
        same_link(&self.link, &other.link)
    }
}

// --- Bookmarks ---

/// A saved result. Older stored entries used `url` for the link field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub title: String,
    #[serde(alias = "url")]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn from_post(post: &Post, created_at: DateTime<Utc>) -> Self {
        Self {
            title: post.title.clone(),
            link: post.link.clone(),
            snippet: post.snippet.clone(),
            created_at,
        }
    }

    pub fn key(&self) -> String {
        canonical_link(&self.link)
    }
}

// --- History ---

/// A past search: the query text plus the results it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    pub data: Vec<Post>,
}

/// Snapshot of the most recent result set, kept under `searchData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    pub query: String,
    pub results: Vec<Post>,
    pub fetched_at: DateTime<Utc>,
}

// --- Chat ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Sender::Ai, content)
    }
}

// --- Accounts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Membership {
    #[default]
    Free,
    Basic,
    Pro,
    Enterprise,
    #[serde(other)]
    Unknown,
}

impl Membership {
    /// Tiers that are never charged credits.
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Membership::Pro | Membership::Enterprise)
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Membership::Free => "Free",
            Membership::Basic => "Basic",
            Membership::Pro => "Pro",
            Membership::Enterprise => "Enterprise",
            Membership::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Remaining-uses counter for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAccount {
    pub credits: i64,
    #[serde(default)]
    pub membership: Membership,
    #[serde(default)]
    pub is_premium: bool,
}

impl CreditAccount {
    pub fn new(credits: i64, membership: Membership) -> Self {
        Self {
            credits,
            membership,
            is_premium: membership.is_unlimited(),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.is_premium || self.membership.is_unlimited()
    }

    /// True when a paid action may proceed.
    pub fn can_spend(&self) -> bool {
        self.is_unlimited() || self.credits > 0
    }
}

// --- Date filters ---

/// Recency window applied to a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
    Today,
    Week,
    /// Roughly the last two months.
    Newest,
    /// Roughly the last two years.
    Oldest,
    #[default]
    Lifetime,
}

impl DateFilter {
    pub const ALL: [DateFilter; 5] = [
        DateFilter::Today,
        DateFilter::Week,
        DateFilter::Newest,
        DateFilter::Oldest,
        DateFilter::Lifetime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateFilter::Today => "today",
            DateFilter::Week => "week",
            DateFilter::Newest => "newest",
            DateFilter::Oldest => "oldest",
            DateFilter::Lifetime => "lifetime",
        }
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateFilter {
    type Err = LexyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateFilter::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LexyError::UnknownVariant {
                kind: "date filter",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_deserializes_without_snippet_or_media() {
        let post: Post =
            serde_json::from_str(r#"{"title":"T","link":"https://x.example"}"#).unwrap();
        assert_eq!(post.snippet, "");
        assert!(post.media.is_none());
    }

    #[test]
    fn media_uses_camel_case_wire_names() {
        let media = Media {
            media_type: MediaType::Video,
            platform: Some("youtube".into()),
            embed_url: Some("https://www.youtube.com/embed/abc".into()),
            url: None,
        };
        let json = serde_json::to_value(&media).unwrap();
        assert_eq!(json["type"], "video");
        assert_eq!(json["embedUrl"], "https://www.youtube.com/embed/abc");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn bookmark_accepts_legacy_url_field() {
        let b: Bookmark = serde_json::from_str(
            r#"{"title":"T","url":"https://x.example","createdAt":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(b.link, "https://x.example");
    }

    #[test]
    fn unknown_membership_tier_is_tolerated() {
        let acct: CreditAccount =
            serde_json::from_str(r#"{"credits":3,"membership":"Platinum"}"#).unwrap();
        assert_eq!(acct.membership, Membership::Unknown);
        assert!(!acct.is_unlimited());
    }

    #[test]
    fn premium_flag_or_pro_tier_is_unlimited() {
        assert!(CreditAccount::new(0, Membership::Pro).can_spend());
        let flagged = CreditAccount {
            credits: 0,
            membership: Membership::Free,
            is_premium: true,
        };
        assert!(flagged.can_spend());
        assert!(!CreditAccount::new(0, Membership::Free).can_spend());
        assert!(!CreditAccount::new(0, Membership::Basic).can_spend());
    }

    #[test]
    fn date_filter_parses_case_insensitively() {
        assert_eq!("Week".parse::<DateFilter>().unwrap(), DateFilter::Week);
        assert!("fortnight".parse::<DateFilter>().is_err());
    }
}
