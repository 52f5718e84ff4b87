use std::sync::Arc;

use ai_client::strip_code_blocks;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lexy_common::{CompletionResponse, RagRequest};
use tracing::{info, warn};

use super::error;
use crate::rag::{rag_user_prompt, relevant_chunks, RAG_SYSTEM_PROMPT};
use crate::AppState;

/// Answer a question about one page from its most relevant chunks.
pub async fn api_rag(State(state): State<Arc<AppState>>, Json(body): Json<RagRequest>) -> Response {
    if body.email.trim().is_empty() {
        return error(StatusCode::FORBIDDEN, "Sign in required");
    }
    if body.content.trim().is_empty() || body.query.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "content and query are required");
    }

    let excerpts = match relevant_chunks(&state.ai, &body.content, &body.query).await {
        Ok(excerpts) => excerpts,
        Err(e) => {
            warn!(url = body.url.as_str(), error = %e, "Embedding failed");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to index page content");
        }
    };
    info!(
        url = body.url.as_str(),
        excerpts = excerpts.len(),
        has_context = body.context.is_some(),
        "RAG request"
    );

    let system = RAG_SYSTEM_PROMPT.replace("SOURCE_URL", &body.url);
    let user = rag_user_prompt(&body.url, &excerpts, body.context.as_deref(), &body.query);

    match state.ai.chat_completion(system, user).await {
        Ok(output) => Json(CompletionResponse {
            output: strip_code_blocks(&output).to_string(),
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Completion failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Completion failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::rest::test_support::{call, state};

    fn completion(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        }))
    }

    #[tokio::test]
    async fn short_page_is_answered_without_embeddings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("https://x.example/post"))
            .and(body_string_contains("Conversation so far"))
            .respond_with(completion("<p>Streaks.</p>"))
            .mount(&server)
            .await;

        let (status, body) = call(
            state(&server.uri(), ""),
            "POST",
            "/api/rag",
            Some(json!({
                "content": "People like streaks.",
                "query": "What do people like?",
                "url": "https://x.example/post",
                "email": "a@b.c",
                "context": "User: hi\nAssistant: hello"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "<p>Streaks.</p>");
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.url.path() != "/embeddings"));
    }

    #[tokio::test]
    async fn long_page_embeds_chunks_and_query_in_one_batch() {
        let server = MockServer::start().await;
        // 6 chunks plus the query
        let data: Vec<_> = (0..7)
            .map(|i| json!({"index": i, "embedding": [1.0, i as f32]}))
            .collect();
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": data})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("<p>Answer</p>"))
            .mount(&server)
            .await;

        let (status, body) = call(
            state(&server.uri(), ""),
            "POST",
            "/api/rag",
            Some(json!({
                "content": "word ".repeat(960),
                "query": "q",
                "url": "https://x.example/post",
                "email": "a@b.c"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "<p>Answer</p>");
    }

    #[tokio::test]
    async fn anonymous_caller_is_forbidden() {
        let (status, _) = call(
            state("http://127.0.0.1:9", ""),
            "POST",
            "/api/rag",
            Some(json!({"content": "c", "query": "q", "url": "u", "email": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
