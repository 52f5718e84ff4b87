pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{GoogleSearchInput, GoogleSearchPage, OrganicResult, RunData};

use serde::de::DeserializeOwned;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apify/google-search-scraper.
const GOOGLE_SEARCH_SCRAPER: &str = "nFJndFXA5zjCTuudP";

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }

    /// Start a Google search run. Returns immediately with run metadata.
    pub async fn start_google_search(&self, input: &GoogleSearchInput) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, GOOGLE_SEARCH_SCRAPER);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::check(resp).await?.json().await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for efficient long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        loop {
            let url = format!("{}/actor-runs/{}?waitForFinish=60", self.base_url, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let api_resp: ApiResponse<RunData> = Self::check(resp).await?.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed(api_resp.data.status));
                }
                _ => {
                    tracing::debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                    continue;
                }
            }
        }
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", self.base_url, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let items: Vec<T> = Self::check(resp).await?.json().await?;
        Ok(items)
    }

    /// Run a Google search end-to-end: start run, poll, fetch results.
    /// Returns the organic results of every page, in page order, capped at `num`.
    pub async fn search_google(&self, query: &str, num: u32) -> Result<Vec<OrganicResult>> {
        tracing::info!(query, num, "Starting Google search run");

        let input = GoogleSearchInput::single(query, num);
        let run = self.start_google_search(&input).await?;
        tracing::info!(run_id = %run.id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        let pages: Vec<GoogleSearchPage> = self
            .get_dataset_items(&completed.default_dataset_id)
            .await?;

        let results: Vec<OrganicResult> = pages
            .into_iter()
            .flat_map(|p| p.organic_results)
            .take(num as usize)
            .collect();
        tracing::info!(count = results.len(), "Fetched organic results");

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn run_json(status: &str) -> serde_json::Value {
        serde_json::json!({
            "data": {"id": "run1", "status": status, "defaultDatasetId": "ds1"}
        })
    }

    #[tokio::test]
    async fn search_google_runs_actor_and_flattens_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/acts/{GOOGLE_SEARCH_SCRAPER}/runs")))
            .respond_with(ResponseTemplate::new(201).set_body_json(run_json("RUNNING")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/actor-runs/run1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_json("SUCCEEDED")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/datasets/ds1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"searchQuery": {"term": "q", "page": 1}, "organicResults": [
                    {"title": "A", "url": "https://a.example", "description": "first"},
                    {"title": "B", "url": "https://b.example", "description": "second"}
                ]},
                {"organicResults": [
                    {"title": "C", "url": "https://c.example"}
                ]}
            ])))
            .mount(&server)
            .await;

        let client = ApifyClient::new("token".into()).with_base_url(&server.uri());
        let results = client.search_google("q", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title.as_deref(), Some("A"));
        assert_eq!(results[1].url.as_deref(), Some("https://b.example"));
    }

    #[tokio::test]
    async fn failed_run_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/actor-runs/run1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_json("FAILED")))
            .mount(&server)
            .await;

        let client = ApifyClient::new("token".into()).with_base_url(&server.uri());
        let err = client.wait_for_run("run1").await.unwrap_err();
        assert!(matches!(err, ApifyError::RunFailed(ref s) if s == "FAILED"));
    }

    #[tokio::test]
    async fn non_success_status_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let client = ApifyClient::new("token".into()).with_base_url(&server.uri());
        let err = client
            .start_google_search(&GoogleSearchInput::single("q", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ApifyError::Api { status: 401, .. }));
    }
}
