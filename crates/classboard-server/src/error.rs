use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use classboard_core::ClassroomError;
use serde_json::json;
use thiserror::Error;

/// Relay error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Message arrived before the connection joined a classroom
    #[error("Not joined to a classroom")]
    NotJoined,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ClassroomError> for AppError {
    fn from(e: ClassroomError) -> Self {
        match e {
            ClassroomError::NotFound(what) => AppError::NotFound(what),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::NotJoined => StatusCode::BAD_REQUEST,
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                StatusCode::BAD_REQUEST
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
