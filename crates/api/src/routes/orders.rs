//! Order endpoints.

use std::sync::Arc;

use auth::Operation;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{OrderId, PageRequest, Role};
use domain::{CreateOrder, OrderPage, UpdateOrder};
use serde::Deserialize;
use store::{Order, OrderQuery, Store};

use super::parse_date;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Bearer, JsonBody, PathId, QueryParams};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub customer_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetParams {
    #[serde(default)]
    pub include_deleted: bool,
}

/// GET /orders
#[tracing::instrument(skip(state, bearer))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    params: QueryParams<ListParams>,
) -> Result<Json<OrderPage>, ApiError> {
    state.authorize(Operation::ListOrders, &bearer).await?;
    let params = params.into_inner()?;

    let mut query = OrderQuery::new(PageRequest::new(params.page, params.limit))
        .include_deleted(params.include_deleted);
    if let Some(name) = params.customer_name.filter(|n| !n.is_empty()) {
        query = query.customer_name(name);
    }
    if let Some(from) = parse_date("startDate", params.start_date.as_deref())? {
        query = query.from(from);
    }
    if let Some(to) = parse_date("endDate", params.end_date.as_deref())? {
        query = query.to(to);
    }
    Ok(Json(state.orders.find_orders(&query).await?))
}

/// GET /orders/{id}
///
/// `includeDeleted` is honoured for admins only.
#[tracing::instrument(skip(state, bearer))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
    params: QueryParams<GetParams>,
) -> Result<Json<Order>, ApiError> {
    let caller = state.require(Operation::GetOrder, &bearer).await?;
    let id = id.into_inner()?;
    let params = params.into_inner()?;
    let include_deleted = params.include_deleted && caller.role == Role::Admin;
    Ok(Json(
        state
            .orders
            .find_order(OrderId::new(id), include_deleted)
            .await?,
    ))
}

/// GET /orders/user/all
#[tracing::instrument(skip_all)]
pub async fn list_own<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
) -> Result<Json<Vec<Order>>, ApiError> {
    let caller = state.require(Operation::ListOwnOrders, &bearer).await?;
    Ok(Json(state.orders.find_orders_by_user(caller.id, false).await?))
}

/// POST /orders
///
/// The caller becomes the order's owner.
#[tracing::instrument(skip_all)]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    input: JsonBody<CreateOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let caller = state.require(Operation::CreateOrder, &bearer).await?;
    let input = input.into_inner()?;
    let order = state
        .orders
        .create_order(input, Some(caller.id), Some(&caller.username))
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// PUT /orders/{id}
#[tracing::instrument(skip(state, bearer, patch))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
    patch: JsonBody<UpdateOrder>,
) -> Result<Json<Order>, ApiError> {
    let caller = state.require(Operation::UpdateOrder, &bearer).await?;
    let id = id.into_inner()?;
    let patch = patch.into_inner()?;
    let order = state
        .orders
        .update_order(OrderId::new(id), patch, Some(&caller.username))
        .await?;
    Ok(Json(order))
}

/// DELETE /orders/{id}
#[tracing::instrument(skip(state, bearer))]
pub async fn remove<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
) -> Result<StatusCode, ApiError> {
    let caller = state.require(Operation::RemoveOrder, &bearer).await?;
    let id = id.into_inner()?;
    state
        .orders
        .remove_order(OrderId::new(id), Some(&caller.username))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
