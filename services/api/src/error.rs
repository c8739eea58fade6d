//! Error taxonomy of the API service and its HTTP rendering

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{mailer::MailError, session::SessionError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::FieldError;
use crate::repositories::RepositoryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("You are not allowed to perform this action")]
    Forbidden,

    /// Missing item, or a draft requested through a public route
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid input")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    Conflict(String),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Message could not be delivered")]
    Delivery(#[source] MailError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Forbidden => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Validation(_) => "Validation",
            ApiError::Conflict(_) => "Conflict",
            ApiError::MissingFields(_) => "MissingFields",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Delivery(_) => "Delivery",
            ApiError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::MissingFields(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Delivery(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ApiError::NotFound("Content"),
            RepositoryError::Conflict(message) => ApiError::Conflict(message),
            RepositoryError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Backend(e) => ApiError::Internal(e),
            SessionError::InvalidToken | SessionError::Expired | SessionError::Revoked => {
                ApiError::Unauthorized
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(e) => error!("Internal error: {:#}", e),
            ApiError::Delivery(e) => error!("Message delivery failed: {}", e),
            _ => {}
        }

        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match &self {
            ApiError::Validation(fields) => error["fields"] = json!(fields),
            ApiError::MissingFields(fields) => error["fields"] = json!(fields),
            _ => {}
        }

        let body = Json(json!({
            "success": false,
            "error": error,
        }));

        (self.status(), body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
