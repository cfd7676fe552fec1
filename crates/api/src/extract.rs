//! Request extractors that reject with [`ApiError`] bodies.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// The bearer token from the `Authorization` header, if any.
///
/// Presence is not checked here; the authorizer decides whether the
/// operation needs one.
#[derive(Debug, Clone, Default)]
pub struct Bearer(pub Option<String>);

impl Bearer {
    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Bearer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                let (scheme, token) = value.split_once(' ')?;
                scheme
                    .eq_ignore_ascii_case("bearer")
                    .then(|| token.trim().to_string())
            })
            .filter(|token| !token.is_empty());
        Ok(Bearer(token))
    }
}

/// JSON body extractor with a JSON error body on rejection.
///
/// A malformed body is held back until [`JsonBody::into_inner`], so handlers
/// authorize the caller before reporting input errors.
#[derive(Debug)]
pub struct JsonBody<T>(Result<T, ApiError>);

impl<T> JsonBody<T> {
    pub fn into_inner(self) -> Result<T, ApiError> {
        self.0
    }
}

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| value)
            .map_err(ApiError::from);
        Ok(JsonBody(body))
    }
}

/// Query string extractor, deferred like [`JsonBody`].
#[derive(Debug)]
pub struct QueryParams<T>(Result<T, ApiError>);

impl<T> QueryParams<T> {
    pub fn into_inner(self) -> Result<T, ApiError> {
        self.0
    }
}

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let query = Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| value)
            .map_err(ApiError::from);
        Ok(QueryParams(query))
    }
}

/// Numeric `{id}` path segment, deferred like [`JsonBody`].
#[derive(Debug)]
pub struct PathId(Result<i64, ApiError>);

impl PathId {
    pub fn into_inner(self) -> Result<i64, ApiError> {
        self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for PathId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let id = Path::<i64>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| id)
            .map_err(ApiError::from);
        Ok(PathId(id))
    }
}
