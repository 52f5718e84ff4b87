use std::sync::Arc;

use ai_client::strip_code_blocks;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lexy_common::{CompletionResponse, PromptRequest};
use tracing::{info, warn};

use super::error;
use crate::AppState;

/// One chat completion. Anonymous callers get 403.
pub async fn api_prompt(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PromptRequest>,
) -> Response {
    if body.email.trim().is_empty() {
        return error(StatusCode::FORBIDDEN, "Sign in required");
    }
    if body.user_prompt.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "userPrompt is required");
    }

    info!(
        system_chars = body.system_prompt.len(),
        user_chars = body.user_prompt.len(),
        "Prompt request"
    );

    match state
        .ai
        .chat_completion(body.system_prompt, body.user_prompt)
        .await
    {
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
