//! Site- and date-scoped search strings in Google's operator syntax.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, Months, NaiveDate};
use lexy_common::{DateFilter, LexyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Reddit,
    Twitter,
    Quora,
    HackerNews,
    DevTo,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Reddit,
        Platform::Twitter,
        Platform::Quora,
        Platform::HackerNews,
        Platform::DevTo,
    ];

    pub fn domain(&self) -> &'static str {
        match self {
            Platform::Reddit => "Reddit.com",
            Platform::Twitter => "Twitter.com",
            Platform::Quora => "Quora.com",
            Platform::HackerNews => "news.ycombinator.com",
            Platform::DevTo => "dev.to",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Platform::Reddit => "Reddit",
            Platform::Twitter => "Twitter",
            Platform::Quora => "Quora",
            Platform::HackerNews => "Hacker News",
            Platform::DevTo => "Dev.to",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Platform {
    type Err = LexyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" | "reddit.com" => Ok(Platform::Reddit),
            "twitter" | "twitter.com" | "x" | "x.com" => Ok(Platform::Twitter),
            "quora" | "quora.com" => Ok(Platform::Quora),
            "hackernews" | "hacker-news" | "hn" | "news.ycombinator.com" => {
                Ok(Platform::HackerNews)
            }
            "devto" | "dev.to" | "dev" => Ok(Platform::DevTo),
            _ => Err(LexyError::UnknownVariant {
                kind: "platform",
                value: s.to_string(),
            }),
        }
    }
}

/// Where a search is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SiteSelection {
    #[default]
    Universal,
    Platform(Platform),
    /// User-entered site; reduced to its host for the `site:` operator.
    Custom(String),
}

impl SiteSelection {
    /// Domain for the `site:` clause, empty for universal search.
    pub fn domain(&self) -> String {
        match self {
            SiteSelection::Universal => String::new(),
            SiteSelection::Platform(p) => p.domain().to_string(),
            SiteSelection::Custom(raw) => custom_host(raw),
        }
    }
}

fn custom_host(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if let Ok(parsed) = url::Url::parse(raw) {
        if let Some(host) = parsed.host_str() {
            return host.to_string();
        }
    }
    let without_scheme = raw.split("://").last().unwrap_or(raw);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

/// Build a query against the local clock's current date.
pub fn build_query(free_text: &str, site: &str, date_filter: DateFilter) -> String {
    build_query_on(free_text, site, date_filter, Local::now().date_naive())
}

/// `site:<domain> <free text> <date clause>`. Empty clauses add no tokens;
/// a trailing space is left when there is no date clause.
pub fn build_query_on(free_text: &str, site: &str, date_filter: DateFilter, today: NaiveDate) -> String {
    let site = site.trim();
    let site_clause = if site.is_empty() {
        String::new()
    } else {
        format!("site:{site} ")
    };
    format!("{site_clause}{free_text} {}", date_clause(date_filter, today))
}

fn date_clause(filter: DateFilter, today: NaiveDate) -> String {
    let after = |start: Option<NaiveDate>| {
        start
            .map(|d| format!("after:{}", d.format("%Y-%m-%d")))
            .unwrap_or_default()
    };
    match filter {
        DateFilter::Today => {
            let yesterday = today.pred_opt().unwrap_or(today);
            format!(
                "after:{} before:{}",
                yesterday.format("%Y-%m-%d"),
                today.format("%Y-%m-%d")
            )
        }
        DateFilter::Week => after(today.checked_sub_days(chrono::Days::new(7))),
        DateFilter::Newest => after(today.checked_sub_months(Months::new(2))),
        DateFilter::Oldest => after(today.checked_sub_months(Months::new(24))),
        DateFilter::Lifetime => String::new(),
    }
}
