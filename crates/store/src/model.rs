//! Persisted entities and the write payloads used to create or change them.

use chrono::{DateTime, Utc};
use common::{CategoryId, Money, OrderId, OrderItemId, ProductId, Role, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Data needed to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Partial change to a user account.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// A catalog product together with the ids of its categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i64,
    pub category_ids: Vec<CategoryId>,
}

/// Data needed to create a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i64,
    pub category_ids: Vec<CategoryId>,
}

/// Partial change to a product's scalar fields.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<i64>,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price captured when the line was written.
    pub price: Money,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OrderItem {
    /// Returns `quantity * price`.
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// The order aggregate root with its current lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer_name: String,
    pub shipping_address: String,
    pub total_amount: Money,
    pub user_id: Option<UserId>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Returns true once the order has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A requested order line, before it is bound to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl OrderLine {
    /// Returns `quantity * price`.
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// Data needed to place an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_name: String,
    pub shipping_address: String,
    pub total_amount: Money,
    pub user_id: Option<UserId>,
    pub lines: Vec<OrderLine>,
}

/// Partial change to an order. `lines`, when present, replaces every
/// existing line.
#[derive(Debug, Clone, Default)]
pub struct OrderChanges {
    pub customer_name: Option<String>,
    pub shipping_address: Option<String>,
    pub total_amount: Option<Money>,
    pub lines: Option<Vec<OrderLine>>,
}

/// Whether order writes move product stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockPolicy {
    /// Stock is tracked elsewhere; orders never touch it.
    #[default]
    Untracked,
    /// Placing an order takes stock, replacing or removing lines returns it.
    Adjust,
}

/// Whether single-line writes refresh the owning order's stored total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TotalPolicy {
    /// The order total is `Σ quantity × price` over its live lines.
    #[default]
    Recompute,
    /// The order total is whatever the last order write stored.
    Keep,
}

/// Data needed to add a single line to an existing order.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// Partial change to a single order line.
#[derive(Debug, Clone, Default)]
pub struct OrderItemChanges {
    pub order_id: Option<OrderId>,
    pub product_id: Option<ProductId>,
    pub quantity: Option<u32>,
    pub price: Option<Money>,
}

/// Kind of mutation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    UpdateCategories,
    UpdatePassword,
    UpdateUsername,
}

impl AuditAction {
    /// Returns the stored action name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::UpdateCategories => "UPDATE_CATEGORIES",
            AuditAction::UpdatePassword => "UPDATE_PASSWORD",
            AuditAction::UpdateUsername => "UPDATE_USERNAME",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit record about to be written. The entity id is stamped by the
/// store once it is known.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub entity_name: String,
    pub action: AuditAction,
    pub changes: serde_json::Value,
    pub performed_by: Option<String>,
}

impl AuditEntry {
    /// Creates an entry for `entity_name` with the given action and payload.
    pub fn new(
        entity_name: impl Into<String>,
        action: AuditAction,
        changes: serde_json::Value,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            action,
            changes,
            performed_by: None,
        }
    }

    /// Attributes the entry to a user.
    pub fn performed_by(mut self, username: Option<impl Into<String>>) -> Self {
        self.performed_by = username.map(Into::into);
        self
    }
}

/// A persisted audit record. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    pub entity_name: String,
    pub entity_id: i64,
    pub action: String,
    pub changes: serde_json::Value,
    pub performed_by: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditLog {
    /// Materializes an entry for the given entity id, stamped now.
    pub fn from_entry(entity_id: i64, entry: AuditEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_name: entry.entity_name,
            entity_id,
            action: entry.action.as_str().to_string(),
            changes: entry.changes,
            performed_by: entry.performed_by,
            timestamp: Utc::now(),
        }
    }
}

/// One row of the date-range order report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub customer_name: String,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

/// Catalog and order counters for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub total_products: u64,
    pub total_categories: u64,
    pub total_orders: u64,
    pub total_revenue: Money,
    pub low_stock_products: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_action_names_match_wire_format() {
        assert_eq!(AuditAction::UpdateCategories.as_str(), "UPDATE_CATEGORIES");
        assert_eq!(
            serde_json::to_value(AuditAction::UpdateCategories).unwrap(),
            serde_json::json!("UPDATE_CATEGORIES")
        );
    }

    #[test]
    fn audit_log_takes_entity_id_from_caller() {
        let entry = AuditEntry::new("Order", AuditAction::Create, serde_json::json!({"a": 1}))
            .performed_by(Some("alice"));
        let log = AuditLog::from_entry(9, entry);

        assert_eq!(log.entity_id, 9);
        assert_eq!(log.action, "CREATE");
        assert_eq!(log.performed_by.as_deref(), Some("alice"));
    }

    #[test]
    fn order_line_total_multiplies_quantity() {
        let line = OrderLine {
            product_id: ProductId::new(1),
            quantity: 3,
            price: Money::from_cents(250),
        };
        assert_eq!(line.line_total(), Money::from_cents(750));
    }
}
