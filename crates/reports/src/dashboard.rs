use common::Money;
use serde::Serialize;
use store::{DashboardCounts, Order};

/// Headline numbers for the admin dashboard.
///
/// Order counts and revenue only include live orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_products: u64,
    pub total_categories: u64,
    pub total_orders: u64,
    pub total_revenue: Money,
    /// Products whose stock is below the configured threshold.
    pub low_stock_products: u64,
    pub recent_orders: Vec<Order>,
}

impl Dashboard {
    pub(crate) fn new(counts: DashboardCounts, recent_orders: Vec<Order>) -> Self {
        Self {
            total_products: counts.total_products,
            total_categories: counts.total_categories,
            total_orders: counts.total_orders,
            total_revenue: counts.total_revenue,
            low_stock_products: counts.low_stock_products,
            recent_orders,
        }
    }
}
