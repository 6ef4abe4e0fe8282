use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ShortenerError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ShortenerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShortenerError::NotFound => StatusCode::NOT_FOUND,
            ShortenerError::AlreadyExists => StatusCode::CONFLICT,
            ShortenerError::Validation(_) => StatusCode::BAD_REQUEST,
            ShortenerError::GenerationExhausted { .. } | ShortenerError::StoreUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ShortenerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
