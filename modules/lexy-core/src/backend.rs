use async_trait::async_trait;
use lexy_common::{
    CompletionResponse, ErrorBody, PromptRequest, RagRequest, ScrapeRequest, ScrapeResponse,
    SearchRequest, SearchResponse,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::BackendError;

/// The `/api/*` routes the workflow consumes.
#[async_trait]
pub trait LexyBackend: Send + Sync {
    /// `POST /api/searchApify`. A `{success:false}` body is returned as-is.
    async fn search(&self, req: &SearchRequest) -> Result<SearchResponse, BackendError>;

    async fn scrape(&self, req: &ScrapeRequest) -> Result<ScrapeResponse, BackendError>;

    /// `POST /api/prompt`. A 403 comes back as [`BackendError::SignInRequired`].
    async fn prompt(&self, req: &PromptRequest) -> Result<CompletionResponse, BackendError>;

    async fn rag(&self, req: &RagRequest) -> Result<CompletionResponse, BackendError>;
}

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = url.as_str(), "POST");

        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();

        if status == StatusCode::FORBIDDEN {
            return Err(BackendError::SignInRequired);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<R>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl LexyBackend for HttpBackend {
    async fn search(&self, req: &SearchRequest) -> Result<SearchResponse, BackendError> {
        let url = format!("{}/api/searchApify", self.base_url);
        let resp = self.http.post(&url).json(req).send().await?;
        let status = resp.status();

        // Failure bodies still carry `{success:false, error}`.
        let text = resp.text().await?;
        match serde_json::from_str::<SearchResponse>(&text) {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => Err(BackendError::Api {
                status: status.as_u16(),
                message: text,
            }),
            Err(e) => Err(BackendError::Parse(e.to_string())),
        }
    }

    async fn scrape(&self, req: &ScrapeRequest) -> Result<ScrapeResponse, BackendError> {
        self.post("/api/scrape", req).await
    }

    async fn prompt(&self, req: &PromptRequest) -> Result<CompletionResponse, BackendError> {
        self.post("/api/prompt", req).await
    }

    async fn rag(&self, req: &RagRequest) -> Result<CompletionResponse, BackendError> {
        self.post("/api/rag", req).await
    }
}
