use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sandpit::SandboxError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::session::SessionError;
use crate::suggest::SuggestError;

/// Errors returned by API handlers
///
/// Every variant renders as a JSON body of the form `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Suggest(#[from] SuggestError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Sandbox(e) if e.is_invalid_input() => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Sandbox(_) | ApiError::Suggest(_) | ApiError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::InvalidInput(msg) | ApiError::Unavailable(msg) => msg.clone(),
            ApiError::Sandbox(SandboxError::InvalidInput(msg)) => msg.clone(),
            ApiError::Sandbox(e) => format!("Failed to execute code: {e}"),
            ApiError::Suggest(_) => "Failed to get AI suggestions".to_owned(),
            ApiError::Session(_) => "Failed to access session store".to_owned(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sandbox_input_is_bad_request() {
        let err = ApiError::from(SandboxError::InvalidInput("code is required".to_owned()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "code is required");
    }

    #[test]
    fn host_failures_are_server_errors() {
        let err = ApiError::from(SandboxError::Internal("thread panicked".to_owned()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = ApiError::from(SuggestError::EmptyResponse);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Failed to get AI suggestions");
    }

    #[test]
    fn unavailable_is_503() {
        let err = ApiError::Unavailable("AI suggestions are not configured".to_owned());
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
