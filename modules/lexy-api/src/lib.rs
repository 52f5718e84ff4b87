pub mod accounts;
pub mod config;
pub mod media;
pub mod page;
pub mod rag;
pub mod rest;

use std::sync::Arc;

use ai_client::OpenAi;
use anyhow::Result;
use apify_client::ApifyClient;
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

pub use accounts::AccountBook;
pub use config::ApiConfig;
pub use page::{BrowserlessFetcher, DirectFetcher, PageFetcher};

pub struct AppState {
    pub ai: OpenAi,
    pub apify: ApifyClient,
    pub pages: Arc<dyn PageFetcher>,
    pub accounts: AccountBook,
}

impl AppState {
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let mut ai = OpenAi::new(&config.openai_api_key, &config.openai_model);
        if let Some(url) = &config.openai_base_url {
            ai = ai.with_base_url(url);
        }

        let mut apify = ApifyClient::new(config.apify_api_token.clone());
        if let Some(url) = &config.apify_base_url {
            apify = apify.with_base_url(url);
        }

        let pages: Arc<dyn PageFetcher> = match &config.browserless_url {
            Some(url) => Arc::new(BrowserlessFetcher::new(
                url,
                config.browserless_token.as_deref(),
            )?),
            None => Arc::new(DirectFetcher::new()?),
        };

        Ok(Self {
            ai,
            apify,
            pages,
            accounts: AccountBook::new(config.default_credits),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/searchApify", post(rest::search::api_search))
        .route("/api/scrape", post(rest::scrape::api_scrape))
        .route("/api/prompt", post(rest::prompt::api_prompt))
        .route("/api/rag", post(rest::rag::api_rag))
        .route("/api/users/{email}", get(rest::users::api_user))
        .route(
            "/api/users/{email}/credits/decrement",
            post(rest::users::api_decrement_credit),
        )
        .route(
            "/api/users/{email}/bookmarks",
            get(rest::users::api_bookmarks)
                .post(rest::users::api_add_bookmark)
                .delete(rest::users::api_remove_bookmark),
        )
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // method + path only; bodies carry emails and page content
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
