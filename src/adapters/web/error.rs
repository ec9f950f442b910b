//! HTTP error responses for the web adapter.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::error::CoachError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl From<CoachError> for WebError {
    fn from(err: CoachError) -> Self {
        Self::new(status_from_error(&err), err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

pub fn status_from_error(err: &CoachError) -> StatusCode {
    match err {
        CoachError::Authorization { .. } => StatusCode::FORBIDDEN,
        CoachError::ModelNotFound { .. } | CoachError::TaskNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        CoachError::RuleSetInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoachError::ConfigParse { .. }
        | CoachError::ConfigMissing { .. }
        | CoachError::ConfigInvalid { .. } => StatusCode::BAD_REQUEST,
        CoachError::StorageUnavailable { .. }
        | CoachError::Persistence { .. }
        | CoachError::Database { .. }
        | CoachError::DatabaseQuery { .. }
        | CoachError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
