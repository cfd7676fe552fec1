//! Admin reports and the audit log.

use std::sync::Arc;

use auth::Operation;
use axum::Json;
use axum::extract::State;
use common::{Money, PageRequest};
use domain::Page;
use reports::Dashboard;
use serde::Deserialize;
use store::{AuditLog, AuditLogQuery, Order, OrderHistoryQuery, OrderSummary, Product, Store};

use super::parse_date;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Bearer, QueryParams};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub entity_name: Option<String>,
    pub action: Option<String>,
    pub performed_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub customer_name: Option<String>,
    pub min_total: Option<Money>,
    pub max_total: Option<Money>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// GET /reports/audit-log
#[tracing::instrument(skip(state, bearer))]
pub async fn audit_log<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    params: QueryParams<AuditLogParams>,
) -> Result<Json<Page<AuditLog>>, ApiError> {
    state.authorize(Operation::AuditLog, &bearer).await?;
    let params = params.into_inner()?;

    let mut query = AuditLogQuery::new(PageRequest::new(params.page, params.limit));
    if let Some(entity_name) = non_empty(params.entity_name) {
        query = query.entity_name(entity_name);
    }
    if let Some(action) = non_empty(params.action) {
        query = query.action(action);
    }
    if let Some(performed_by) = non_empty(params.performed_by) {
        query = query.performed_by(performed_by);
    }
    Ok(Json(state.audit.get_audit_logs(&query).await?))
}

/// GET /reports/stock-levels
#[tracing::instrument(skip_all)]
pub async fn stock_levels<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
) -> Result<Json<Vec<Product>>, ApiError> {
    state.authorize(Operation::StockLevels, &bearer).await?;
    Ok(Json(state.reports.stock_levels().await?))
}

/// GET /reports/order-history
#[tracing::instrument(skip(state, bearer))]
pub async fn order_history<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    params: QueryParams<HistoryParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    state.authorize(Operation::OrderHistory, &bearer).await?;
    let params = params.into_inner()?;

    let query = OrderHistoryQuery {
        from: parse_date("startDate", params.start_date.as_deref())?,
        to: parse_date("endDate", params.end_date.as_deref())?,
        customer_name: non_empty(params.customer_name),
        min_total: params.min_total,
        max_total: params.max_total,
        include_deleted: params.include_deleted,
    };
    Ok(Json(state.reports.order_history(&query).await?))
}

/// GET /reports/order-history/report
#[tracing::instrument(skip(state, bearer))]
pub async fn order_report<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
    params: QueryParams<RangeParams>,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    state.authorize(Operation::OrderReport, &bearer).await?;
    let params = params.into_inner()?;

    let from = parse_date("startDate", params.start_date.as_deref())?;
    let to = parse_date("endDate", params.end_date.as_deref())?;
    Ok(Json(state.reports.order_report(from, to).await?))
}

/// GET /reports/dashboard
#[tracing::instrument(skip_all)]
pub async fn dashboard<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    bearer: Bearer,
) -> Result<Json<Dashboard>, ApiError> {
    state.authorize(Operation::Dashboard, &bearer).await?;
    Ok(Json(state.reports.dashboard().await?))
}
