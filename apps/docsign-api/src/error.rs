//! Error types for DocSign API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docsign_core::LoadError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Document already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid PDF: {0}")]
    InvalidPdf(#[from] LoadError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::TemplateNotFound(_)
            | ApiError::DocumentNotFound(_)
            | ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SessionExpired => StatusCode::GONE,
            ApiError::AlreadyCompleted(_) => StatusCode::CONFLICT,
            ApiError::InvalidRequest(_) | ApiError::InvalidPdf(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal error".to_string()
            }
            ApiError::SessionExpired => "Session has expired".to_string(),
            ApiError::InvalidRequest(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
