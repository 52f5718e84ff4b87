pub mod prompt;
pub mod rag;
pub mod scrape;
pub mod search;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lexy_common::ErrorBody;

pub(crate) fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}
