//! Registration and login.

use std::sync::Arc;

use auth::{IssuedToken, Operation};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{Credentials, UserProfile};
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Bearer, JsonBody};

/// POST /auth/register
#[tracing::instrument(skip_all)]
pub async fn register<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    input: JsonBody<Credentials>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    state.authorize(Operation::Register, &bearer).await?;
    let input = input.into_inner()?;
    let profile = state.users.register(input).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /auth/login
#[tracing::instrument(skip_all)]
pub async fn login<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    input: JsonBody<Credentials>,
) -> Result<Json<IssuedToken>, ApiError> {
    state.authorize(Operation::Login, &bearer).await?;
    let input = input.into_inner()?;
    Ok(Json(state.users.login(input).await?))
}
