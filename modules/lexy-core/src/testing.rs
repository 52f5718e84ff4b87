//! Test doubles for the backend and notifier boundaries.
//!
//! `MockBackend` answers from per-route queues of scripted responses and
//! records every request it receives, so tests can assert both what came
//! back and what went over the wire (including that nothing did).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lexy_common::{
    CompletionResponse, Post, PromptRequest, RagRequest, ScrapeRequest, ScrapeResponse,
    ScrapeSummary, SearchRequest, SearchResponse,
};

use crate::backend::LexyBackend;
use crate::error::BackendError;
use crate::notice::{Notice, Notifier};

/// `n` distinct posts titled `Post 1..=n`.
pub fn sample_posts(n: usize) -> Vec<Post> {
    (1..=n)
        .map(|i| {
            Post::new(
                format!("Post {i}"),
                format!("https://example.com/post/{i}"),
                format!("Snippet for post {i}"),
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Search(SearchRequest),
    Scrape(ScrapeRequest),
    Prompt(PromptRequest),
    Rag(RagRequest),
}

type Scripted<T> = VecDeque<(Duration, Result<T, BackendError>)>;

#[derive(Default)]
struct Script {
    search: Scripted<SearchResponse>,
    scrape: Scripted<ScrapeResponse>,
    prompt: Scripted<CompletionResponse>,
    rag: Scripted<CompletionResponse>,
}

/// Unscripted calls fail with a network error.
#[derive(Default)]
pub struct MockBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<BackendCall>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut *self.script.lock().unwrap());
        self
    }

    pub fn on_search(self, posts: Vec<Post>) -> Self {
        self.on_search_after(Duration::ZERO, posts)
    }

    /// Responds only after `delay`, for racing searches against each other.
    pub fn on_search_after(self, delay: Duration, posts: Vec<Post>) -> Self {
        self.script(|s| s.search.push_back((delay, Ok(SearchResponse::ok(posts)))))
    }

    pub fn on_search_failure(self, error: &str) -> Self {
        let body = SearchResponse::failed(error);
        self.script(|s| s.search.push_back((Duration::ZERO, Ok(body))))
    }

    pub fn on_search_error(self) -> Self {
        self.script(|s| {
            s.search.push_back((
                Duration::ZERO,
                Err(BackendError::Network("connection refused".into())),
            ))
        })
    }

    pub fn on_scrape(self, main_content: &str) -> Self {
        let page = ScrapeResponse {
            summary: ScrapeSummary {
                main_content: main_content.to_string(),
                ..ScrapeSummary::default()
            },
            semantic_content: None,
        };
        self.script(|s| s.scrape.push_back((Duration::ZERO, Ok(page))))
    }

    pub fn on_prompt(self, output: &str) -> Self {
        self.on_prompt_after(Duration::ZERO, output)
    }

    pub fn on_prompt_after(self, delay: Duration, output: &str) -> Self {
        let resp = CompletionResponse {
            output: output.to_string(),
        };
        self.script(|s| s.prompt.push_back((delay, Ok(resp))))
    }

    pub fn on_prompt_error(self, err: BackendError) -> Self {
        self.script(|s| s.prompt.push_back((Duration::ZERO, Err(err))))
    }

    pub fn on_rag(self, output: &str) -> Self {
        let resp = CompletionResponse {
            output: output.to_string(),
        };
        self.script(|s| s.rag.push_back((Duration::ZERO, Ok(resp))))
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Search(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn scrapes(&self) -> Vec<ScrapeRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Scrape(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn prompts(&self) -> Vec<PromptRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Prompt(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn rags(&self) -> Vec<RagRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Rag(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn answer<T>(next: Option<(Duration, Result<T, BackendError>)>) -> Result<T, BackendError> {
        match next {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Err(BackendError::Network("no scripted response".into())),
        }
    }
}

#[async_trait]
impl LexyBackend for MockBackend {
    async fn search(&self, req: &SearchRequest) -> Result<SearchResponse, BackendError> {
        self.record(BackendCall::Search(req.clone()));
        let next = self.script.lock().unwrap().search.pop_front();
        Self::answer(next).await
    }

    async fn scrape(&self, req: &ScrapeRequest) -> Result<ScrapeResponse, BackendError> {
        self.record(BackendCall::Scrape(req.clone()));
        let next = self.script.lock().unwrap().scrape.pop_front();
        Self::answer(next).await
    }

    async fn prompt(&self, req: &PromptRequest) -> Result<CompletionResponse, BackendError> {
        self.record(BackendCall::Prompt(req.clone()));
        let next = self.script.lock().unwrap().prompt.pop_front();
        Self::answer(next).await
    }

    async fn rag(&self, req: &RagRequest) -> Result<CompletionResponse, BackendError> {
        self.record(BackendCall::Rag(req.clone()));
        let next = self.script.lock().unwrap().rag.pop_front();
        Self::answer(next).await
    }
}

/// Keeps every notice for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}
