//! Direct management of single order lines.
//!
//! These operations never move product stock. When the order policy
//! recomputes totals, every order a line write touches gets its total
//! refreshed in the same transaction.

use common::{Money, OrderId, OrderItemId, PageRequest, ProductId};
use serde::{Deserialize, Serialize};
use store::{AuditAction, NewOrderItem, OrderItem, OrderItemChanges, OrderStore};

use crate::OrderPolicy;
use crate::audit::{self, entity};
use crate::error::{DomainError, Result};
use crate::page::Page;
use crate::validation::ValidationErrors;

/// Input for adding a line to an existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl CreateOrderItem {
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.positive("quantity", self.quantity);
        errors.non_negative("price", self.price);
        line_in_range(&mut errors, self.price, self.quantity);
        errors.into_result()
    }
}

/// Partial update of a line. Present ids are re-resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
}

impl UpdateOrderItem {
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(quantity) = self.quantity {
            errors.positive("quantity", quantity);
        }
        if let Some(price) = self.price {
            errors.non_negative("price", price);
        }
        if let (Some(price), Some(quantity)) = (self.price, self.quantity) {
            line_in_range(&mut errors, price, quantity);
        }
        errors.into_result()
    }
}

fn line_in_range(errors: &mut ValidationErrors, price: Money, quantity: u32) {
    if price.checked_multiply(quantity).is_none() {
        errors.add("price", "times quantity is out of range");
    }
}

/// Service for single order lines.
pub struct OrderItemService<S: OrderStore> {
    store: S,
    policy: OrderPolicy,
}

impl<S: OrderStore> OrderItemService<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, OrderPolicy::default())
    }

    pub fn with_policy(store: S, policy: OrderPolicy) -> Self {
        Self { store, policy }
    }

    /// Adds a line. Fails with `NotFound` naming the order or the product.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: CreateOrderItem, actor: Option<&str>) -> Result<OrderItem> {
        input.validate()?;

        let changes = serde_json::to_value(&input)?;
        let item = NewOrderItem {
            order_id: input.order_id,
            product_id: input.product_id,
            quantity: input.quantity,
            price: input.price,
        };
        let audit = audit::entry(entity::ORDER_ITEM, AuditAction::Create, changes, actor);
        let created = self
            .store
            .create_order_item(item, self.policy.totals(), audit)
            .await?;
        audit::recorded(entity::ORDER_ITEM);
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_all(&self, page: PageRequest) -> Result<Page<OrderItem>> {
        let (data, total) = self.store.list_order_items(page).await?;
        Ok(Page::new(data, total, page))
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_one(&self, id: OrderItemId) -> Result<OrderItem> {
        self.store
            .find_order_item(id)
            .await?
            .ok_or_else(|| DomainError::not_found(entity::ORDER_ITEM, id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(
        &self,
        id: OrderItemId,
        patch: UpdateOrderItem,
        actor: Option<&str>,
    ) -> Result<OrderItem> {
        patch.validate()?;

        let changes = serde_json::to_value(&patch)?;
        let item_changes = OrderItemChanges {
            order_id: patch.order_id,
            product_id: patch.product_id,
            quantity: patch.quantity,
            price: patch.price,
        };
        let audit = audit::entry(entity::ORDER_ITEM, AuditAction::Update, changes, actor);
        let updated = self
            .store
            .update_order_item(id, item_changes, self.policy.totals(), audit)
            .await?;
        audit::recorded(entity::ORDER_ITEM);
        Ok(updated)
    }

    /// Hard-deletes a line.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, id: OrderItemId, actor: Option<&str>) -> Result<()> {
        let existing = self.find_one(id).await?;
        let changes = serde_json::to_value(&existing)?;

        let audit = audit::entry(entity::ORDER_ITEM, AuditAction::Delete, changes, actor);
        self.store
            .delete_order_item(id, self.policy.totals(), audit)
            .await?;
        audit::recorded(entity::ORDER_ITEM);
        Ok(())
    }
}
