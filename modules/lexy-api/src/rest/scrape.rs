use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lexy_common::ScrapeRequest;
use tracing::{info, warn};

use super::error;
use crate::page::{extract_page, validate_external_url};
use crate::AppState;

pub async fn api_scrape(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScrapeRequest>,
) -> Response {
    let url = match validate_external_url(&body.url) {
        Ok(u) => u,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let html = match state.pages.fetch(&url).await {
        Ok(html) => html,
        Err(e) => {
            warn!(url = %url, error = %e, "Page fetch failed");
            return error(StatusCode::BAD_GATEWAY, "Failed to fetch page");
        }
    };

    // Readability extraction is CPU-bound.
    let page_url = url.clone();
    let page = match tokio::task::spawn_blocking(move || extract_page(&html, &page_url)).await {
        Ok(page) => page,
        Err(e) => {
            warn!(url = %url, error = %e, "Content extraction failed");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read page");
        }
    };

    info!(
        url = %url,
        chars = page.summary.main_content.chars().count(),
        signed_in = body.email.is_some(),
        "Page scraped"
    );
    Json(page).into_response()
}
