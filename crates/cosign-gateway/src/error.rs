use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use cosign_core::error::CosignError;

/// Handler error carrying the HTTP status it maps to.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<CosignError> for ApiError {
    fn from(e: CosignError) -> Self {
        let status = match &e {
            CosignError::InvalidRequest(_) | CosignError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            CosignError::UnknownParty(_) => StatusCode::NOT_FOUND,
            CosignError::AlreadyRunning(_) => StatusCode::CONFLICT,
            CosignError::Generation { .. }
            | CosignError::Generator(_)
            | CosignError::Dispatch { .. }
            | CosignError::Mail(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("error"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
