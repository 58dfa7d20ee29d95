//! API error type shared by every route.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Client-facing request error. Serializes as `{"detail": ...}` with the
/// mapped status code.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("User with name '{name}' and phone number '{phone_number}' is already registered.")]
    AlreadyRegistered { name: String, phone_number: String },

    #[error("Could not decode image")]
    UndecodableImage,

    #[error("No face detected in the image")]
    NoFaceDetected,

    #[error("User with name '{name}' and phone number '{phone_number}' not found")]
    UnknownIdentity { name: String, phone_number: String },

    #[error("face analysis failed")]
    Engine(#[source] EngineError),

    #[error("face store unavailable")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::AlreadyRegistered { .. }
            | ApiError::UndecodableImage
            | ApiError::NoFaceDetected => StatusCode::BAD_REQUEST,
            ApiError::UnknownIdentity { .. } => StatusCode::NOT_FOUND,
            ApiError::Engine(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NoFace => ApiError::NoFaceDetected,
            other => ApiError::Engine(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Client mistakes are expected traffic; only log the server side.
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
