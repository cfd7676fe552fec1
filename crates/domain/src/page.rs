use common::PageRequest;
use serde::Serialize;
use store::Order;

/// A page of results with its position, as returned by the audit log and
/// the catalog and item listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    /// `ceil(total / limit)`, zero when there are no rows.
    pub last_page: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            data,
            total,
            page: request.page,
            last_page: request.page_count(total),
        }
    }
}

/// A page of orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub total_pages: u64,
}
