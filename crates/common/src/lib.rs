//! Shared value types for the inventory management system.

pub mod money;
pub mod page;
pub mod role;
mod types;

pub use money::{Money, MoneyError};
pub use page::PageRequest;
pub use role::{Role, UnknownRole};
pub use types::{CategoryId, OrderId, OrderItemId, ProductId, UserId};
