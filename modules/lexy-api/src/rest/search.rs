use std::sync::Arc;

use apify_client::OrganicResult;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lexy_common::{Post, SearchRequest, SearchResponse};
use tracing::{info, warn};

use crate::media;
use crate::AppState;

const MAX_RESULTS: u32 = 100;

fn to_post(result: OrganicResult) -> Option<Post> {
    let link = result.url.filter(|u| !u.trim().is_empty())?;
    let title = result
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| link.clone());
    Some(media::enrich(Post::new(
        title,
        link,
        result.description.unwrap_or_default(),
    )))
}

/// Failures answer `{success:false, error}` so the client can treat them as "no results".
pub async fn api_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchRequest>,
) -> Response {
    let query = body.query.trim();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SearchResponse::failed("Query is required")),
        )
            .into_response();
    }
    let num = body.num.clamp(1, MAX_RESULTS);

    match state.apify.search_google(query, num).await {
        Ok(results) => {
            let posts: Vec<Post> = results.into_iter().filter_map(to_post).collect();
            info!(query, num, count = posts.len(), "Search completed");
            Json(SearchResponse::ok(posts)).into_response()
        }
        Err(e) => {
            warn!(query, error = %e, "Search failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SearchResponse::failed(e.to_string())),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::rest::test_support::{call, state};

    async fn mount_run(server: &MockServer, items: serde_json::Value) {
        let run = json!({"data": {"id": "run1", "status": "SUCCEEDED", "defaultDatasetId": "ds1"}});
        Mock::given(method("POST"))
            .and(path_regex(r"^/acts/[^/]+/runs$"))
            .respond_with(ResponseTemplate::new(201).set_body_json(run.clone()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/actor-runs/run1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/datasets/ds1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn maps_organic_results_to_posts() {
        let server = MockServer::start().await;
        mount_run(
            &server,
            json!([{"organicResults": [
                {"title": "Best apps", "url": "https://www.reddit.com/r/fitness/a", "description": "Thread"},
                {"title": "Demo", "url": "https://youtu.be/xyz"},
                {"title": "No link"}
            ]}]),
        )
        .await;

        let (status, body) = call(
            state(&server.uri(), ""),
            "POST",
            "/api/searchApify",
            Some(json!({"query": "site:Reddit.com fitness apps ", "num": 10})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["link"], "https://www.reddit.com/r/fitness/a");
        assert_eq!(data[0]["snippet"], "Thread");
        assert!(data[0].get("media").is_none());
        assert_eq!(data[1]["media"]["type"], "video");
        assert_eq!(data[1]["media"]["embedUrl"], "https://www.youtube.com/embed/xyz");
    }

    #[tokio::test]
    async fn upstream_failure_is_success_false_with_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let (status, body) = call(
            state(&server.uri(), ""),
            "POST",
            "/api/searchApify",
            Some(json!({"query": "q", "num": 10})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("401"));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let (status, body) = call(
            state("http://127.0.0.1:9", ""),
            "POST",
            "/api/searchApify",
            Some(json!({"query": "  ", "num": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
