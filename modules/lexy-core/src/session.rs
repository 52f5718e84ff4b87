use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use lexy_common::{DateFilter, LexyError, Post};

use crate::fetcher::{ResultFetcher, SearchOutcome};
use crate::pagination::{LoadMore, Paginator};
use crate::query::{build_query, SiteSelection};

/// Number of results requested from the search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultCount {
    #[default]
    Ten,
    TwentyFive,
    Fifty,
}

impl ResultCount {
    pub fn get(&self) -> usize {
        match self {
            ResultCount::Ten => 10,
            ResultCount::TwentyFive => 25,
            ResultCount::Fifty => 50,
        }
    }
}

impl fmt::Display for ResultCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl FromStr for ResultCount {
    type Err = LexyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "10" => Ok(ResultCount::Ten),
            "25" => Ok(ResultCount::TwentyFive),
            "50" => Ok(ResultCount::Fifty),
            other => Err(LexyError::UnknownVariant {
                kind: "result count",
                value: other.to_string(),
            }),
        }
    }
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchInput {
    pub text: String,
    pub site: SiteSelection,
    pub date_filter: DateFilter,
    pub result_count: ResultCount,
}

impl SearchInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn query(&self) -> String {
        build_query(&self.text, &self.site.domain(), self.date_filter)
    }
}

/// One explicit search: its input, the query sent, and the paging state.
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub input: SearchInput,
    pub query: String,
    pub paginator: Paginator,
}

/// Owns the current session; each committed search replaces it.
pub struct SearchController {
    fetcher: Arc<ResultFetcher>,
    page_size: usize,
    session: Mutex<Option<SearchSession>>,
}

impl SearchController {
    pub fn new(fetcher: Arc<ResultFetcher>, page_size: usize) -> Self {
        Self {
            fetcher,
            page_size,
            session: Mutex::new(None),
        }
    }

    pub fn fetcher(&self) -> &Arc<ResultFetcher> {
        &self.fetcher
    }

    pub async fn search(&self, input: SearchInput) -> SearchOutcome {
        let query = input.query();
        let count = input.result_count.get();
        self.fetcher
            .search_then(&query, count, |posts| {
                let session = SearchSession {
                    paginator: Paginator::new(posts.to_vec(), self.page_size),
                    query: query.clone(),
                    input,
                };
                *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
            })
            .await
    }

    pub fn session(&self) -> Option<SearchSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn visible(&self) -> Vec<Post> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.paginator.visible().to_vec())
            .unwrap_or_default()
    }

    pub fn load_more(&self) -> LoadMore {
        match self.session.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            Some(session) => session.paginator.load_more(),
            None => LoadMore::Exhausted,
        }
    }

    /// All loaded results, the sources for an analysis.
    pub fn results(&self) -> Vec<Post> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.paginator.results().to_vec())
            .unwrap_or_default()
    }
}
