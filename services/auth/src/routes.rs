//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::{TypedHeader, headers::UserAgent};
use common::session::SessionSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::{
    AppState,
    error::AuthError,
    extract::{Params, Payload},
    middleware::require_session,
    models::{IssuedSession, SessionMeta, User, UserView},
    service::SignInOutcome,
};

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub trusted_device_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub challenge_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub challenge_token: String,
    pub code: String,
    #[serde(default)]
    pub trust_device: bool,
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Response for any flow ending with a new session
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub user: UserView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_device_token: Option<String>,
}

impl SessionResponse {
    fn new(session: IssuedSession, user: &User) -> Self {
        Self {
            success: true,
            token: session.token,
            expires_at: session.expires_at,
            user: UserView::from(user),
            trusted_device_token: None,
        }
    }
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/auth/session", get(get_session))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/two-factor/enable", post(enable_two_factor))
        .route("/auth/two-factor/disable", post(disable_two_factor))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/verify-email", get(verify_email))
        .route("/auth/send-verification-email", post(send_verification_email))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/two-factor/send-otp", post(send_otp))
        .route("/auth/two-factor/verify-otp", post(verify_otp))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .merge(authenticated)
        .with_state(state)
}

fn meta(user_agent: Option<TypedHeader<UserAgent>>) -> SessionMeta {
    SessionMeta {
        user_agent: user_agent.map(|TypedHeader(ua)| ua.as_str().to_string()),
    }
}

fn ok() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match common::database::health_check(&state.db_pool).await {
        Ok(healthy) => healthy,
        Err(e) => {
            error!("Database health check failed: {}", e);
            false
        }
    };
    let cache = state.cache.health_check().await.unwrap_or(false);

    let status = if database && cache {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "service": "auth-service",
            "database": database,
            "cache": cache,
        })),
    )
}

pub async fn sign_up(
    State(state): State<AppState>,
    Payload(payload): Payload<SignUpRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let user = state
        .auth
        .sign_up(&payload.email, &payload.name, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": UserView::from(&user) })),
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    Params(query): Params<TokenQuery>,
) -> Result<Json<SessionResponse>, AuthError> {
    let (session, user) = state.auth.verify_email(&query.token, &meta(user_agent)).await?;
    Ok(Json(SessionResponse::new(session, &user)))
}

pub async fn send_verification_email(
    State(state): State<AppState>,
    Payload(payload): Payload<EmailRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state.auth.send_verification_email(&payload.email).await?;
    Ok(ok())
}

pub async fn sign_in(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    Payload(payload): Payload<SignInRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let outcome = state
        .auth
        .sign_in(
            &payload.email,
            &payload.password,
            payload.trusted_device_token.as_deref(),
            &meta(user_agent),
        )
        .await?;

    Ok(match outcome {
        SignInOutcome::Authenticated { session, user } => {
            info!(user_id = %user.id, "User signed in");
            Json(json!(SessionResponse::new(session, &user)))
        }
        SignInOutcome::TwoFactorRequired { challenge_token } => Json(json!({
            "success": true,
            "twoFactorRedirect": true,
            "challengeToken": challenge_token,
        })),
    })
}

pub async fn send_otp(
    State(state): State<AppState>,
    Payload(payload): Payload<SendOtpRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state.auth.send_otp(&payload.challenge_token).await?;
    Ok(ok())
}

pub async fn verify_otp(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    Payload(payload): Payload<VerifyOtpRequest>,
) -> Result<Json<SessionResponse>, AuthError> {
    let verified = state
        .auth
        .verify_otp(
            &payload.challenge_token,
            &payload.code,
            payload.trust_device,
            &meta(user_agent),
        )
        .await?;

    let mut response = SessionResponse::new(verified.session, &verified.user);
    response.trusted_device_token = verified.trusted_device_token;
    Ok(Json(response))
}

pub async fn enable_two_factor(
    State(state): State<AppState>,
    Extension(session): Extension<SessionSnapshot>,
    Payload(payload): Payload<PasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state.auth.enable_two_factor(&session, &payload.password).await?;
    Ok(ok())
}

pub async fn disable_two_factor(
    State(state): State<AppState>,
    Extension(session): Extension<SessionSnapshot>,
    Payload(payload): Payload<PasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state.auth.disable_two_factor(&session, &payload.password).await?;
    Ok(ok())
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Payload(payload): Payload<EmailRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state.auth.request_password_reset(&payload.email).await?;
    Ok(ok())
}

pub async fn reset_password(
    State(state): State<AppState>,
    Payload(payload): Payload<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .auth
        .reset_password(&payload.token, &payload.new_password)
        .await?;
    Ok(ok())
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(session): Extension<SessionSnapshot>,
) -> Result<impl IntoResponse, AuthError> {
    let user = state.auth.get_session(&session).await?;
    Ok(Json(json!({
        "success": true,
        "session": session,
        "user": UserView::from(&user),
    })))
}

pub async fn sign_out(
    State(state): State<AppState>,
    Extension(session): Extension<SessionSnapshot>,
) -> Result<impl IntoResponse, AuthError> {
    state.auth.sign_out(&session).await?;
    info!(user_id = %session.user_id, "User signed out");
    Ok(ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryAuthRepository;
    use crate::service::{AuthOptions, AuthService};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use common::{
        cache::{Cache, MemoryCache},
        jwt::{JwtConfig, JwtService},
        mailer::LogMailer,
        principal::Policy,
        settings::Settings,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const EMAIL: &str = "analyst@firm.com";

    fn state() -> (AppState, LogMailer) {
        let mut settings = Settings::default();
        settings.admin.email = "admin@firm.com".to_string();
        settings.auth.allowlist = vec![EMAIL.to_string()];
        settings.auth.resend_cooldown_secs = 0;
        settings.auth.reset_response_floor_ms = 0;

        let mailer = LogMailer::new();
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let jwt = JwtService::new(JwtConfig::with_secret("routes-test-secret-0123456789abcdef"))
            .unwrap();
        let auth = AuthService::new(
            Arc::new(MemoryAuthRepository::new()),
            cache.clone(),
            jwt,
            Arc::new(mailer.clone()),
            Policy::new(&settings.admin.email),
            AuthOptions::from_settings(&settings),
        );
        let db_pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();

        (
            AppState {
                auth,
                cache,
                db_pool,
            },
            mailer,
        )
    }

    async fn call(
        state: &AppState,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let resp = create_router(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_sign_up_verify_session_sign_out() {
        let (state, mailer) = state();

        let (status, body) = call(
            &state,
            "POST",
            "/auth/sign-up",
            None,
            Some(json!({ "email": EMAIL, "name": "Ada", "password": "Sunrise2026" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["emailVerified"], false);
        assert!(body["user"].get("passwordHash").is_none());

        let text = mailer.last_to(EMAIL).await.unwrap().text;
        let token = text
            .split("token=")
            .nth(1)
            .and_then(|t| t.split_whitespace().next())
            .unwrap()
            .to_string();

        let (status, body) = call(
            &state,
            "GET",
            &format!("/auth/verify-email?token={token}"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let session_token = body["token"].as_str().unwrap().to_string();

        let (status, body) = call(&state, "GET", "/auth/session", Some(&session_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], EMAIL);

        let (status, _) = call(&state, "POST", "/auth/sign-out", Some(&session_token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, "GET", "/auth/session", Some(&session_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_vetoed_sign_up_renders_structured_error() {
        let (state, mailer) = state();

        let (status, body) = call(
            &state,
            "POST",
            "/auth/sign-up",
            None,
            Some(json!({ "email": "eve@elsewhere.com", "name": "Eve", "password": "Sunrise2026" })),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["kind"], "SignupNotAllowed");
        assert!(mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_requests_use_error_envelope() {
        let (state, _) = state();

        let (status, body) = call(
            &state,
            "POST",
            "/auth/sign-in",
            None,
            Some(json!({ "password": "Sunrise2026" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "BadRequest");
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("missing field `email`")
        );

        let (status, body) = call(&state, "GET", "/auth/verify-email", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "BadRequest");

        let (status, body) = call(
            &state,
            "POST",
            "/auth/two-factor/verify-otp",
            None,
            Some(json!({ "challengeToken": "abc", "code": "123456", "trustDevice": "yes" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "BadRequest");
    }

    #[tokio::test]
    async fn test_session_requires_bearer() {
        let (state, _) = state();
        let (status, _) = call(&state, "GET", "/auth/session", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_forgot_password_has_constant_shape() {
        let (state, _) = state();

        let (status, body) = call(
            &state,
            "POST",
            "/auth/forgot-password",
            None,
            Some(json!({ "email": "nobody@firm.com" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
    }

    #[tokio::test]
    async fn test_reset_with_unknown_token() {
        let (state, _) = state();

        let (status, body) = call(
            &state,
            "POST",
            "/auth/reset-password",
            None,
            Some(json!({ "token": "nope", "newPassword": "Moonrise2027" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "InvalidOrExpiredToken");
    }
}
