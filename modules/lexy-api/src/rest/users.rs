use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lexy_common::BookmarkMutation;
use tracing::debug;

use super::error;
use crate::AppState;

fn valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.contains('@')
}

pub async fn api_user(State(state): State<Arc<AppState>>, Path(email): Path<String>) -> Response {
    if !valid_email(&email) {
        return error(StatusCode::BAD_REQUEST, "Invalid email");
    }
    Json(state.accounts.get(&email).await).into_response()
}

pub async fn api_decrement_credit(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Response {
    if !valid_email(&email) {
        return error(StatusCode::BAD_REQUEST, "Invalid email");
    }
    let doc = state.accounts.decrement_credit(&email).await;
    debug!(credits = doc.account.credits, "Credit decremented");
    Json(doc).into_response()
}

pub async fn api_bookmarks(State(state): State<Arc<AppState>>, Path(email): Path<String>) -> Response {
    if !valid_email(&email) {
        return error(StatusCode::BAD_REQUEST, "Invalid email");
    }
    Json(state.accounts.bookmarks(&email).await).into_response()
}

pub async fn api_add_bookmark(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    Json(body): Json<BookmarkMutation>,
) -> Response {
    if !valid_email(&email) {
        return error(StatusCode::BAD_REQUEST, "Invalid email");
    }
    Json(state.accounts.add_bookmark(&email, body.bookmark).await).into_response()
}

pub async fn api_remove_bookmark(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    Json(body): Json<BookmarkMutation>,
) -> Response {
    if !valid_email(&email) {
        return error(StatusCode::BAD_REQUEST, "Invalid email");
    }
    Json(state.accounts.remove_bookmark(&email, &body.bookmark).await).into_response()
}
