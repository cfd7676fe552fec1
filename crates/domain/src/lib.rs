//! Domain layer for the inventory management system.
//!
//! This crate provides the services that own every write:
//! - Order aggregate (orders and their lines, written atomically)
//! - Order item sub-operations for direct line management
//! - Audit trail queries
//! - Product and category catalog
//! - User accounts and login

pub mod audit;
pub mod catalog;
pub mod error;
pub mod order;
pub mod order_item;
pub mod page;
pub mod user;
pub mod validation;

pub use audit::{AuditService, entity};
pub use catalog::{
    CatalogService, CategoryInput, CreateProduct, UpdateProduct, UpdateProductCategories,
};
pub use error::{DomainError, Result};
pub use order::{CreateOrder, OrderPolicy, OrderService, UpdateOrder};
pub use order_item::{CreateOrderItem, OrderItemService, UpdateOrderItem};
pub use page::{OrderPage, Page};
pub use user::{ChangePassword, ChangeUsername, Credentials, UserProfile, UserService};
pub use validation::ValidationErrors;
