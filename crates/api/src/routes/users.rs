//! The caller's own account.

use std::sync::Arc;

use auth::Operation;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{ChangePassword, ChangeUsername, UserProfile};
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Bearer, JsonBody};

/// GET /users/me
#[tracing::instrument(skip_all)]
pub async fn profile<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
) -> Result<Json<UserProfile>, ApiError> {
    let caller = state.require(Operation::Profile, &bearer).await?;
    Ok(Json(state.users.profile(&caller).await?))
}

/// PUT /users/me/password
#[tracing::instrument(skip_all)]
pub async fn change_password<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    input: JsonBody<ChangePassword>,
) -> Result<StatusCode, ApiError> {
    let caller = state.require(Operation::ChangePassword, &bearer).await?;
    let input = input.into_inner()?;
    state.users.change_password(&caller, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /users/me/username
///
/// Tokens issued under the old username stop working; the caller must log
/// in again.
#[tracing::instrument(skip_all)]
pub async fn change_username<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    input: JsonBody<ChangeUsername>,
) -> Result<Json<UserProfile>, ApiError> {
    let caller = state.require(Operation::ChangeUsername, &bearer).await?;
    let input = input.into_inner()?;
    Ok(Json(state.users.change_username(&caller, input).await?))
}
