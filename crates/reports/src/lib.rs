//! Read-only reports over the catalog and the order aggregate.
//!
//! - Stock levels, lowest first
//! - Order history with independent filters
//! - Date-range order report
//! - Dashboard counters and the most recent orders

pub mod dashboard;
pub mod service;

pub use dashboard::Dashboard;
pub use service::{DEFAULT_LOW_STOCK_THRESHOLD, RECENT_ORDERS, ReportService};
