use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::availability::AvailabilityError;
use crate::services::pricing::IntervalError;
use crate::services::search::SearchError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid request")]
    InvalidRequest(#[from] validator::ValidationErrors),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("payment provider error: {0}")]
    Provider(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<IntervalError> for AppError {
    fn from(err: IntervalError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Storage(e) => AppError::Storage(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::UnknownVehicle(_) => AppError::NotFound(err.to_string()),
            AvailabilityError::Unavailable(_) => AppError::Conflict(err.to_string()),
            AvailabilityError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = match &self {
            AppError::InvalidRequest(details) => {
                serde_json::json!({ "error": self.to_string(), "details": details })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}
