//! Order item endpoints.

use std::sync::Arc;

use auth::Operation;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::OrderItemId;
use domain::{CreateOrderItem, Page, UpdateOrderItem};
use store::{OrderItem, Store};

use super::PageParams;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Bearer, JsonBody, PathId, QueryParams};

/// GET /order-items
#[tracing::instrument(skip(state, bearer))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    params: QueryParams<PageParams>,
) -> Result<Json<Page<OrderItem>>, ApiError> {
    state.authorize(Operation::ListOrderItems, &bearer).await?;
    let params = params.into_inner()?;
    Ok(Json(state.order_items.find_all(params.request()).await?))
}

/// GET /order-items/{id}
#[tracing::instrument(skip(state, bearer))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
) -> Result<Json<OrderItem>, ApiError> {
    state.authorize(Operation::GetOrderItem, &bearer).await?;
    let id = id.into_inner()?;
    Ok(Json(state.order_items.find_one(OrderItemId::new(id)).await?))
}

/// POST /order-items
#[tracing::instrument(skip_all)]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    input: JsonBody<CreateOrderItem>,
) -> Result<(StatusCode, Json<OrderItem>), ApiError> {
    let caller = state.require(Operation::CreateOrderItem, &bearer).await?;
    let input = input.into_inner()?;
    let item = state
        .order_items
        .create(input, Some(&caller.username))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /order-items/{id}
#[tracing::instrument(skip(state, bearer, patch))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
    patch: JsonBody<UpdateOrderItem>,
) -> Result<Json<OrderItem>, ApiError> {
    let caller = state.require(Operation::UpdateOrderItem, &bearer).await?;
    let id = id.into_inner()?;
    let patch = patch.into_inner()?;
    let item = state
        .order_items
        .update(OrderItemId::new(id), patch, Some(&caller.username))
        .await?;
    Ok(Json(item))
}

/// DELETE /order-items/{id}
#[tracing::instrument(skip(state, bearer))]
pub async fn remove<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
) -> Result<StatusCode, ApiError> {
    let caller = state.require(Operation::RemoveOrderItem, &bearer).await?;
    let id = id.into_inner()?;
    state
        .order_items
        .remove(OrderItemId::new(id), Some(&caller.username))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
