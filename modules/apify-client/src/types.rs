use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for the apify/google-search-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct GoogleSearchInput {
    /// Newline-separated queries; one query per run here.
    pub queries: String,
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
    #[serde(rename = "maxPagesPerQuery")]
    pub max_pages_per_query: u32,
    #[serde(rename = "mobileResults")]
    pub mobile_results: bool,
    #[serde(rename = "saveHtml")]
    pub save_html: bool,
}

impl GoogleSearchInput {
    pub fn single(query: &str, results_per_page: u32) -> Self {
        Self {
            queries: query.to_string(),
            results_per_page,
            max_pages_per_query: 1,
            mobile_results: false,
            save_html: false,
        }
    }
}

/// One dataset item: a single results page for one query.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleSearchPage {
    #[serde(rename = "searchQuery", default)]
    pub search_query: Option<SearchQueryMeta>,
    #[serde(rename = "organicResults", default)]
    pub organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQueryMeta {
    pub term: Option<String>,
    pub page: Option<u32>,
}

/// A single organic Google result.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganicResult {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub position: Option<u32>,
}

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}
