//! Authentication error taxonomy and its HTTP rendering

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{mailer::MailError, session::SessionError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Body or query string that does not deserialize
    #[error("{0}")]
    BadRequest(String),

    #[error("This email address is not permitted to register")]
    SignupNotAllowed,

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("Invalid or expired code")]
    InvalidOtp,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Too many attempts, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Email could not be delivered")]
    EmailDelivery(#[source] MailError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation { .. } => "Validation",
            AuthError::BadRequest(_) => "BadRequest",
            AuthError::SignupNotAllowed => "SignupNotAllowed",
            AuthError::EmailTaken => "EmailTaken",
            AuthError::InvalidCredentials => "InvalidCredentials",
            AuthError::EmailNotVerified => "EmailNotVerified",
            AuthError::InvalidOtp => "InvalidOtp",
            AuthError::InvalidOrExpiredToken => "InvalidOrExpiredToken",
            AuthError::Unauthorized => "Unauthorized",
            AuthError::RateLimited { .. } => "RateLimited",
            AuthError::EmailDelivery(_) => "EmailDelivery",
            AuthError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation { .. } | AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::SignupNotAllowed | AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::InvalidOtp
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::EmailDelivery(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Backend(e) => AuthError::Internal(e),
            SessionError::InvalidToken | SessionError::Expired | SessionError::Revoked => {
                AuthError::Unauthorized
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Internal(e) => error!("Internal error: {:#}", e),
            AuthError::EmailDelivery(e) => error!("Email delivery failed: {}", e),
            _ => {}
        }

        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match &self {
            AuthError::Validation { field, .. } => {
                error["field"] = json!(field);
            }
            AuthError::RateLimited { retry_after_secs } => {
                error["retryAfter"] = json!(retry_after_secs);
            }
            _ => {}
        }

        let body = Json(json!({
            "success": false,
            "error": error,
        }));

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(AuthError::SignupNotAllowed.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::InvalidOtp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::RateLimited { retry_after_secs: 3 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::EmailDelivery(MailError::Delivery("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_session_errors_become_unauthorized() {
        assert!(matches!(
            AuthError::from(SessionError::Revoked),
            AuthError::Unauthorized
        ));
        assert!(matches!(
            AuthError::from(SessionError::Backend(anyhow::anyhow!("db down"))),
            AuthError::Internal(_)
        ));
    }

    #[test]
    fn test_internal_message_hides_cause() {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "Internal server error");
    }
}
