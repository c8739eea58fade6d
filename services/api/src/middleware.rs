//! Bearer session resolution for admin routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::principal::Principal;
use tracing::debug;

use crate::{error::ApiError, state::AppState};

/// Principal behind the request, if any. The authorization guard decides
/// what an absent principal may do.
#[derive(Debug, Clone, Default)]
pub struct CurrentPrincipal(pub Option<Principal>);

impl CurrentPrincipal {
    pub fn get(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

/// Resolve an optional bearer token into a [`CurrentPrincipal`] extension.
/// A token that is present but invalid, expired or revoked is rejected.
pub async fn resolve_principal(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = match bearer {
        Some(TypedHeader(Authorization(bearer))) => {
            let session = state.sessions.validate(bearer.token()).await.map_err(|e| {
                debug!("Rejected bearer token: {}", e);
                ApiError::from(e)
            })?;
            Some(session.principal())
        }
        None => None,
    };

    req.extensions_mut().insert(CurrentPrincipal(principal));
    Ok(next.run(req).await)
}
