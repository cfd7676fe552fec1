//! Category endpoints.

use std::sync::Arc;

use auth::Operation;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::CategoryId;
use domain::CategoryInput;
use store::{Category, Store};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Bearer, JsonBody, PathId};

/// GET /categories
#[tracing::instrument(skip_all)]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
) -> Result<Json<Vec<Category>>, ApiError> {
    state.authorize(Operation::ListCategories, &bearer).await?;
    Ok(Json(state.catalog.list_categories().await?))
}

/// GET /categories/{id}
#[tracing::instrument(skip(state, bearer))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
) -> Result<Json<Category>, ApiError> {
    state.authorize(Operation::GetCategory, &bearer).await?;
    let id = id.into_inner()?;
    Ok(Json(state.catalog.get_category(CategoryId::new(id)).await?))
}

/// POST /categories
#[tracing::instrument(skip_all)]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    input: JsonBody<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let caller = state.require(Operation::CreateCategory, &bearer).await?;
    let input = input.into_inner()?;
    let category = state
        .catalog
        .create_category(input, Some(&caller.username))
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /categories/{id}
#[tracing::instrument(skip(state, bearer, input))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
    input: JsonBody<CategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let caller = state.require(Operation::UpdateCategory, &bearer).await?;
    let id = id.into_inner()?;
    let input = input.into_inner()?;
    let category = state
        .catalog
        .update_category(CategoryId::new(id), input, Some(&caller.username))
        .await?;
    Ok(Json(category))
}

/// DELETE /categories/{id}
#[tracing::instrument(skip(state, bearer))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
) -> Result<StatusCode, ApiError> {
    let caller = state.require(Operation::DeleteCategory, &bearer).await?;
    let id = id.into_inner()?;
    state
        .catalog
        .delete_category(CategoryId::new(id), Some(&caller.username))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
