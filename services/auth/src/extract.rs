//! Request extractors whose rejections render as [`AuthError`]

use async_trait::async_trait;
use axum::{
    extract::{
        FromRequest, FromRequestParts, Request,
        rejection::{JsonRejection, QueryRejection},
    },
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::AuthError;

/// JSON request body
#[derive(Debug, Clone, Default)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, St> FromRequest<St> for Payload<T>
where
    T: DeserializeOwned,
    St: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &St) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Query string parameters
#[derive(Debug, Clone, Default)]
pub struct Params<T>(pub T);

#[async_trait]
impl<T, St> FromRequestParts<St> for Params<T>
where
    T: DeserializeOwned,
    St: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) =
            axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::BadRequest(detail(&rejection.body_text()))
    }
}

impl From<QueryRejection> for AuthError {
    fn from(rejection: QueryRejection) -> Self {
        AuthError::BadRequest(detail(&rejection.body_text()))
    }
}

/// Deserializer message without axum's generic prefix
fn detail(text: &str) -> String {
    ["target type: ", "query string: "]
        .iter()
        .find_map(|prefix| text.split_once(prefix).map(|(_, detail)| detail))
        .unwrap_or(text)
        .to_string()
}
