use chrono::{DateTime, Utc};
use common::PageRequest;
use domain::{DomainError, Result, ValidationErrors};
use store::{Order, OrderHistoryQuery, OrderQuery, OrderStore, OrderSummary, Product, ReportStore};

use crate::dashboard::Dashboard;

/// Stock below this counts as low unless configured otherwise.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Number of orders shown on the dashboard.
pub const RECENT_ORDERS: u32 = 5;

/// Service producing the reports.
pub struct ReportService<S> {
    store: S,
    low_stock_threshold: i64,
}

impl<S: ReportStore + OrderStore> ReportService<S> {
    /// Creates a report service with the default low-stock threshold.
    pub fn new(store: S) -> Self {
        Self::with_low_stock_threshold(store, DEFAULT_LOW_STOCK_THRESHOLD)
    }

    pub fn with_low_stock_threshold(store: S, low_stock_threshold: i64) -> Self {
        Self {
            store,
            low_stock_threshold,
        }
    }

    /// Every product, lowest stock first.
    #[tracing::instrument(skip(self))]
    pub async fn stock_levels(&self) -> Result<Vec<Product>> {
        Ok(self.store.stock_levels().await?)
    }

    /// Orders with their lines, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn order_history(&self, query: &OrderHistoryQuery) -> Result<Vec<Order>> {
        Ok(self.store.order_history(query).await?)
    }

    /// Live orders created within the inclusive range, oldest first.
    /// Both bounds are required.
    #[tracing::instrument(skip(self))]
    pub async fn order_report(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<OrderSummary>> {
        let (Some(from), Some(to)) = (start_date, end_date) else {
            let mut errors = ValidationErrors::new();
            if start_date.is_none() {
                errors.add("startDate", "is required");
            }
            if end_date.is_none() {
                errors.add("endDate", "is required");
            }
            return Err(DomainError::Validation(errors));
        };
        Ok(self.store.order_summaries(from, to).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn dashboard(&self) -> Result<Dashboard> {
        let counts = self
            .store
            .dashboard_counts(self.low_stock_threshold)
            .await?;
        let recent = OrderQuery::new(PageRequest::new(Some(1), Some(RECENT_ORDERS)));
        let (recent_orders, _) = self.store.list_orders(&recent).await?;
        Ok(Dashboard::new(counts, recent_orders))
    }
}
