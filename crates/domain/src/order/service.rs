//! Order service: the only write path into the order aggregate.

use common::{Money, OrderId, UserId};
use store::{AuditAction, NewOrder, Order, OrderChanges, OrderQuery, OrderStore};

use crate::audit::{self, entity};
use crate::error::{DomainError, Result};
use crate::page::OrderPage;

use super::{CreateOrder, OrderPolicy, UpdateOrder};

/// Service for managing orders.
///
/// Each write commits the order, its lines, any stock movement and one audit
/// record together.
pub struct OrderService<S: OrderStore> {
    store: S,
    policy: OrderPolicy,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service with the default policy.
    pub fn new(store: S) -> Self {
        Self::with_policy(store, OrderPolicy::default())
    }

    pub fn with_policy(store: S, policy: OrderPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> OrderPolicy {
        self.policy
    }

    /// Places an order owned by `owner`.
    ///
    /// Fails with `NotFound` naming the first product id that does not
    /// resolve, in which case nothing is persisted.
    #[tracing::instrument(
        skip(self, input),
        fields(customer = %input.customer_name, items = input.items.len())
    )]
    pub async fn create_order(
        &self,
        input: CreateOrder,
        owner: Option<UserId>,
        actor: Option<&str>,
    ) -> Result<Order> {
        input.validate()?;

        let changes = serde_json::to_value(&input)?;
        let order = NewOrder {
            total_amount: self.policy.total(input.total_amount, &input.items),
            customer_name: input.customer_name,
            shipping_address: input.shipping_address,
            user_id: owner,
            lines: input.items,
        };

        let audit = audit::entry(entity::ORDER, AuditAction::Create, changes, actor);
        let created = self
            .store
            .create_order(order, self.policy.stock(), audit)
            .await?;

        audit::recorded(entity::ORDER);
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %created.id, total = %created.total_amount, "Order created");
        Ok(created)
    }

    /// Applies a partial update and returns the reloaded order.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_order(
        &self,
        id: OrderId,
        patch: UpdateOrder,
        actor: Option<&str>,
    ) -> Result<Order> {
        patch.validate()?;

        let changes = serde_json::to_value(&patch)?;
        // Without new lines the stored total already matches the stored lines.
        let total_amount = if self.policy.recompute_total {
            patch
                .items
                .as_deref()
                .map(|lines| self.policy.total(Money::zero(), lines))
        } else {
            patch.total_amount
        };
        let order_changes = OrderChanges {
            customer_name: patch.customer_name,
            shipping_address: patch.shipping_address,
            total_amount,
            lines: patch.items,
        };

        let audit = audit::entry(entity::ORDER, AuditAction::Update, changes, actor);
        let updated = self
            .store
            .update_order(id, order_changes, self.policy.stock(), audit)
            .await?;

        audit::recorded(entity::ORDER);
        metrics::counter!("orders_updated_total").increment(1);
        Ok(updated)
    }

    /// Soft-deletes the order and its lines. A second call fails with
    /// `NotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn remove_order(&self, id: OrderId, actor: Option<&str>) -> Result<()> {
        let existing = self.find_order(id, false).await?;
        let changes = serde_json::to_value(&existing)?;

        let audit = audit::entry(entity::ORDER, AuditAction::Delete, changes, actor);
        self.store
            .soft_delete_order(id, self.policy.stock(), audit)
            .await?;

        audit::recorded(entity::ORDER);
        metrics::counter!("orders_removed_total").increment(1);
        tracing::info!(order_id = %id, "Order removed");
        Ok(())
    }

    /// Loads an order with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn find_order(&self, id: OrderId, include_deleted: bool) -> Result<Order> {
        self.store
            .find_order(id, include_deleted)
            .await?
            .ok_or_else(|| DomainError::not_found(entity::ORDER, id))
    }

    /// Lists orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn find_orders(&self, query: &OrderQuery) -> Result<OrderPage> {
        let (orders, total) = self.store.list_orders(query).await?;
        Ok(OrderPage {
            orders,
            total,
            total_pages: query.page.page_count(total),
        })
    }

    /// Lists every order owned by the user, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn find_orders_by_user(
        &self,
        user_id: UserId,
        include_deleted: bool,
    ) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_user(user_id, include_deleted).await?)
    }
}
