//! Product endpoints.

use std::sync::Arc;

use auth::Operation;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{PageRequest, ProductId};
use domain::{CreateProduct, Page, UpdateProduct, UpdateProductCategories};
use serde::Deserialize;
use store::{Product, ProductQuery, Store};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Bearer, JsonBody, PathId, QueryParams};

#[derive(Debug, Deserialize)]
pub struct ProductParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Case-insensitive name substring.
    pub search: Option<String>,
}

/// GET /products
#[tracing::instrument(skip(state, bearer))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    params: QueryParams<ProductParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    state.authorize(Operation::ListProducts, &bearer).await?;
    let params = params.into_inner()?;
    let query = ProductQuery {
        page: PageRequest::new(params.page, params.limit),
        search: params.search.filter(|s| !s.trim().is_empty()),
    };
    Ok(Json(state.catalog.list_products(&query).await?))
}

/// GET /products/{id}
#[tracing::instrument(skip(state, bearer))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
) -> Result<Json<Product>, ApiError> {
    state.authorize(Operation::GetProduct, &bearer).await?;
    let id = id.into_inner()?;
    Ok(Json(state.catalog.get_product(ProductId::new(id)).await?))
}

/// POST /products
#[tracing::instrument(skip_all)]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    input: JsonBody<CreateProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let caller = state.require(Operation::CreateProduct, &bearer).await?;
    let input = input.into_inner()?;
    let product = state
        .catalog
        .create_product(input, Some(&caller.username))
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /products/{id}
#[tracing::instrument(skip(state, bearer, patch))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
    patch: JsonBody<UpdateProduct>,
) -> Result<Json<Product>, ApiError> {
    let caller = state.require(Operation::UpdateProduct, &bearer).await?;
    let id = id.into_inner()?;
    let patch = patch.into_inner()?;
    let product = state
        .catalog
        .update_product(ProductId::new(id), patch, Some(&caller.username))
        .await?;
    Ok(Json(product))
}

/// PUT /products/{id}/categories
#[tracing::instrument(skip(state, bearer, input))]
pub async fn update_categories<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
    input: JsonBody<UpdateProductCategories>,
) -> Result<Json<Product>, ApiError> {
    let caller = state
        .require(Operation::UpdateProductCategories, &bearer)
        .await?;
    let id = id.into_inner()?;
    let input = input.into_inner()?;
    let product = state
        .catalog
        .update_product_categories(ProductId::new(id), input, Some(&caller.username))
        .await?;
    Ok(Json(product))
}

/// DELETE /products/{id}
#[tracing::instrument(skip(state, bearer))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    id: PathId,
) -> Result<StatusCode, ApiError> {
    let caller = state.require(Operation::DeleteProduct, &bearer).await?;
    let id = id.into_inner()?;
    state
        .catalog
        .delete_product(ProductId::new(id), Some(&caller.username))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
