use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CategoryId, OrderId, OrderItemId, PageRequest, ProductId, UserId};

use crate::{
    AuditEntry, AuditLog, AuditLogQuery, Category, DashboardCounts, NewOrder, NewOrderItem,
    NewProduct, NewUser, Order, OrderChanges, OrderHistoryQuery, OrderItem, OrderItemChanges,
    OrderQuery, OrderSummary, Product, ProductChanges, ProductQuery, Result, StockPolicy,
    TotalPolicy, User, UserChanges,
};

/// User account persistence.
///
/// Every mutating method writes its audit entry in the same transaction.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. Fails with `Conflict` when the username is taken.
    async fn insert_user(&self, user: NewUser, audit: AuditEntry) -> Result<User>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Applies the present fields. Fails with `Conflict` when the new
    /// username is taken.
    async fn update_user(&self, id: UserId, changes: UserChanges, audit: AuditEntry)
    -> Result<User>;
}

/// Products, categories and the many-to-many link between them.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_category(&self, name: String, audit: AuditEntry) -> Result<Category>;

    /// Returns every category ordered by id.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>>;

    async fn rename_category(
        &self,
        id: CategoryId,
        name: String,
        audit: AuditEntry,
    ) -> Result<Category>;

    /// Hard-deletes a category and unlinks it from every product.
    async fn delete_category(&self, id: CategoryId, audit: AuditEntry) -> Result<()>;

    /// Inserts a product. Every category id must exist.
    async fn insert_product(&self, product: NewProduct, audit: AuditEntry) -> Result<Product>;

    /// Returns one page of products ordered by id, plus the total match count.
    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)>;

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
        audit: AuditEntry,
    ) -> Result<Product>;

    /// Replaces the product's category set. Every category id must exist.
    async fn set_product_categories(
        &self,
        id: ProductId,
        category_ids: Vec<CategoryId>,
        audit: AuditEntry,
    ) -> Result<Product>;

    /// Hard-deletes a product. Fails with `Conflict` while any order line
    /// references it.
    async fn delete_product(&self, id: ProductId, audit: AuditEntry) -> Result<()>;
}

/// The order aggregate and its lines.
///
/// Aggregate writes are atomic: either the order, all of its lines, any
/// stock movement, and the audit entry are committed, or none are.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order and its lines. Fails with `NotFound` naming the first
    /// product id that does not resolve.
    async fn create_order(
        &self,
        order: NewOrder,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<Order>;

    /// Applies the present scalar fields and, when `lines` is present,
    /// replaces every existing line. Returns the reloaded order.
    async fn update_order(
        &self,
        id: OrderId,
        changes: OrderChanges,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<Order>;

    /// Soft-deletes the order and its lines. Fails with `NotFound` when the
    /// order is absent or already deleted.
    async fn soft_delete_order(
        &self,
        id: OrderId,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<()>;

    async fn find_order(&self, id: OrderId, include_deleted: bool) -> Result<Option<Order>>;

    /// Returns one page of orders, newest first, plus the total match count.
    async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64)>;

    /// Returns every order owned by the user, newest first.
    async fn orders_for_user(&self, user_id: UserId, include_deleted: bool) -> Result<Vec<Order>>;

    /// Adds one line to an existing, live order.
    ///
    /// The single-line writes refresh the total of every order they touch
    /// under [`TotalPolicy::Recompute`], failing with `Conflict` when the sum
    /// leaves the cent range.
    async fn create_order_item(
        &self,
        item: NewOrderItem,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<OrderItem>;

    async fn find_order_item(&self, id: OrderItemId) -> Result<Option<OrderItem>>;

    /// Returns one page of live lines ordered by id, plus the total count.
    async fn list_order_items(&self, page: PageRequest) -> Result<(Vec<OrderItem>, u64)>;

    async fn update_order_item(
        &self,
        id: OrderItemId,
        changes: OrderItemChanges,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<OrderItem>;

    /// Hard-deletes a single line.
    async fn delete_order_item(
        &self,
        id: OrderItemId,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<()>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entity_id: i64, entry: AuditEntry) -> Result<AuditLog>;

    /// Returns one page of matching records, newest first, plus the total
    /// match count.
    async fn query_audit_logs(&self, query: &AuditLogQuery) -> Result<(Vec<AuditLog>, u64)>;
}

/// Read-only aggregate queries backing the reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Every product, lowest stock first.
    async fn stock_levels(&self) -> Result<Vec<Product>>;

    /// Matching orders with their lines, newest first.
    async fn order_history(&self, query: &OrderHistoryQuery) -> Result<Vec<Order>>;

    /// Live orders created within `[from, to]`, oldest first.
    async fn order_summaries(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OrderSummary>>;

    async fn dashboard_counts(&self, low_stock_threshold: i64) -> Result<DashboardCounts>;
}

/// Everything the services need from a backend.
pub trait Store:
    UserStore + CatalogStore + OrderStore + AuditStore + ReportStore + Clone + 'static
{
}

impl<T> Store for T where
    T: UserStore + CatalogStore + OrderStore + AuditStore + ReportStore + Clone + 'static
{
}
