//! Bearer session authentication

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;

use crate::{AppState, error::AuthError};

/// Resolve the bearer token to a live session and expose it to handlers as
/// an `Extension<SessionSnapshot>`
pub async fn require_session(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::Unauthorized)?;

    let session = state.auth.authenticate(bearer.token()).await.map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        e
    })?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}
