use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CategoryId, Money, OrderId, OrderItemId, PageRequest, ProductId, UserId};
use tokio::sync::RwLock;

use crate::query::contains_ignore_case;
use crate::{
    AuditEntry, AuditLog, AuditLogQuery, AuditStore, Category, CatalogStore, DashboardCounts,
    NewOrder, NewOrderItem, NewProduct, NewUser, Order, OrderChanges, OrderHistoryQuery,
    OrderItem, OrderItemChanges, OrderLine, OrderQuery, OrderStore, OrderSummary, Product,
    ProductChanges, ProductQuery, ReportStore, Result, StockPolicy, StoreError, TotalPolicy, User,
    UserChanges, UserStore,
};

#[derive(Debug, Default)]
struct Sequences {
    user: i64,
    category: i64,
    product: i64,
    order: i64,
    item: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    /// Order rows; `items` is always empty here and filled on read.
    orders: BTreeMap<OrderId, Order>,
    items: BTreeMap<OrderItemId, OrderItem>,
    audit: Vec<AuditLog>,
    seq: Sequences,
}

impl MemoryState {
    fn live_order(&self, id: OrderId) -> Result<&Order> {
        self.orders
            .get(&id)
            .filter(|o| !o.is_deleted())
            .ok_or_else(|| StoreError::not_found("Order", id))
    }

    fn require_product(&self, id: ProductId) -> Result<()> {
        if self.products.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::not_found("Product", id))
        }
    }

    fn require_categories(&self, ids: &[CategoryId]) -> Result<()> {
        match ids.iter().find(|id| !self.categories.contains_key(id)) {
            Some(missing) => Err(StoreError::not_found("Category", *missing)),
            None => Ok(()),
        }
    }

    fn items_of(&self, order_id: OrderId, include_deleted: bool) -> Vec<OrderItem> {
        self.items
            .values()
            .filter(|i| i.order_id == order_id && (include_deleted || i.deleted_at.is_none()))
            .cloned()
            .collect()
    }

    /// Sums the live lines of `order_id` once `replaced` is swapped for
    /// `with`. Either side may be absent.
    fn total_after(
        &self,
        order_id: OrderId,
        replaced: Option<OrderItemId>,
        with: Option<&OrderItem>,
    ) -> Result<Money> {
        self.items
            .values()
            .filter(|i| i.order_id == order_id && i.deleted_at.is_none())
            .filter(|i| Some(i.id) != replaced)
            .chain(with.filter(|i| i.order_id == order_id))
            .try_fold(Money::zero(), |acc, i| {
                i.price
                    .checked_multiply(i.quantity)
                    .and_then(|line_total| acc.checked_add(line_total))
            })
            .ok_or_else(|| {
                StoreError::Conflict(format!("total of order {order_id} is out of range"))
            })
    }

    fn set_totals(&mut self, totals: Vec<(OrderId, Money)>) {
        for (order_id, total) in totals {
            if let Some(order) = self.orders.get_mut(&order_id) {
                order.total_amount = total;
            }
        }
    }

    fn hydrate(&self, order: &Order, include_deleted: bool) -> Order {
        Order {
            items: self.items_of(order.id, include_deleted),
            ..order.clone()
        }
    }

    /// Checks that `debit` can be taken once the quantities in `credit`
    /// have been returned.
    fn check_stock(&self, credit: &[OrderItem], debit: &[OrderLine]) -> Result<()> {
        let mut needed: HashMap<ProductId, i64> = HashMap::new();
        for line in debit {
            *needed.entry(line.product_id).or_default() += i64::from(line.quantity);
        }
        for (product_id, quantity) in needed {
            let returned: i64 = credit
                .iter()
                .filter(|i| i.product_id == product_id)
                .map(|i| i64::from(i.quantity))
                .sum();
            let stock = self
                .products
                .get(&product_id)
                .map(|p| p.stock)
                .ok_or_else(|| StoreError::not_found("Product", product_id))?;
            let available = stock + returned;
            if quantity > available {
                return Err(StoreError::Conflict(format!(
                    "insufficient stock for product {product_id}: requested {quantity}, available {available}"
                )));
            }
        }
        Ok(())
    }

    fn move_stock(&mut self, credit: &[OrderItem], debit: &[OrderLine]) {
        for item in credit {
            if let Some(p) = self.products.get_mut(&item.product_id) {
                p.stock += i64::from(item.quantity);
            }
        }
        for line in debit {
            if let Some(p) = self.products.get_mut(&line.product_id) {
                p.stock -= i64::from(line.quantity);
            }
        }
    }

    fn insert_lines(&mut self, order_id: OrderId, lines: Vec<OrderLine>) {
        for line in lines {
            let id = OrderItemId::new(next(&mut self.seq.item));
            self.items.insert(
                id,
                OrderItem {
                    id,
                    order_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price: line.price,
                    deleted_at: None,
                },
            );
        }
    }

    fn audit(&mut self, entity_id: i64, entry: AuditEntry) -> AuditLog {
        let log = AuditLog::from_entry(entity_id, entry);
        self.audit.push(log.clone());
        log
    }
}

fn page_of<T>(rows: Vec<T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    let rows = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    (rows, total)
}

fn within(ts: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.is_none_or(|from| ts >= from) && to.is_none_or(|to| ts <= to)
}

fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// In-memory store implementation for testing and single-process runs.
///
/// A single lock guards all tables, so every trait method is atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of audit records written so far.
    pub async fn audit_count(&self) -> usize {
        self.state.read().await.audit.len()
    }

    /// Returns every order line ever written for the order, including
    /// soft-deleted ones.
    pub async fn raw_items(&self, order_id: OrderId) -> Vec<OrderItem> {
        self.state.read().await.items_of(order_id, true)
    }

    /// Clears all tables and resets id sequences.
    pub async fn clear(&self) {
        *self.state.write().await = MemoryState::default();
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: NewUser, audit: AuditEntry) -> Result<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username {} is already taken",
                user.username
            )));
        }

        let id = UserId::new(next(&mut state.seq.user));
        let user = User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        state.users.insert(id, user.clone());
        state.audit(id.as_i64(), audit);
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: UserChanges,
        audit: AuditEntry,
    ) -> Result<User> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&id) {
            return Err(StoreError::not_found("User", id));
        }
        if let Some(ref username) = changes.username
            && state
                .users
                .values()
                .any(|u| u.id != id && &u.username == username)
        {
            return Err(StoreError::Conflict(format!(
                "username {username} is already taken"
            )));
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("User", id))?;
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        let user = user.clone();
        state.audit(id.as_i64(), audit);
        Ok(user)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_category(&self, name: String, audit: AuditEntry) -> Result<Category> {
        let mut state = self.state.write().await;
        let id = CategoryId::new(next(&mut state.seq.category));
        let category = Category { id, name };
        state.categories.insert(id, category.clone());
        state.audit(id.as_i64(), audit);
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.state.read().await.categories.values().cloned().collect())
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.state.read().await.categories.get(&id).cloned())
    }

    async fn rename_category(
        &self,
        id: CategoryId,
        name: String,
        audit: AuditEntry,
    ) -> Result<Category> {
        let mut state = self.state.write().await;
        let category = state
            .categories
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Category", id))?;
        category.name = name;
        let category = category.clone();
        state.audit(id.as_i64(), audit);
        Ok(category)
    }

    async fn delete_category(&self, id: CategoryId, audit: AuditEntry) -> Result<()> {
        let mut state = self.state.write().await;
        if state.categories.remove(&id).is_none() {
            return Err(StoreError::not_found("Category", id));
        }
        for product in state.products.values_mut() {
            product.category_ids.retain(|c| *c != id);
        }
        state.audit(id.as_i64(), audit);
        Ok(())
    }

    async fn insert_product(&self, product: NewProduct, audit: AuditEntry) -> Result<Product> {
        let mut state = self.state.write().await;
        state.require_categories(&product.category_ids)?;

        let mut category_ids = product.category_ids;
        category_ids.sort();
        category_ids.dedup();

        let id = ProductId::new(next(&mut state.seq.product));
        let product = Product {
            id,
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            category_ids,
        };
        state.products.insert(id, product.clone());
        state.audit(id.as_i64(), audit);
        Ok(product)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        let state = self.state.read().await;
        let rows: Vec<Product> = state
            .products
            .values()
            .filter(|p| {
                query
                    .search
                    .as_deref()
                    .is_none_or(|s| contains_ignore_case(&p.name, s))
            })
            .cloned()
            .collect();
        Ok(page_of(rows, query.page))
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
        audit: AuditEntry,
    ) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        if let Some(name) = changes.name {
            product.name = name;
        }
        if let Some(description) = changes.description {
            product.description = description;
        }
        if let Some(price) = changes.price {
            product.price = price;
        }
        if let Some(stock) = changes.stock {
            product.stock = stock;
        }
        let product = product.clone();
        state.audit(id.as_i64(), audit);
        Ok(product)
    }

    async fn set_product_categories(
        &self,
        id: ProductId,
        mut category_ids: Vec<CategoryId>,
        audit: AuditEntry,
    ) -> Result<Product> {
        let mut state = self.state.write().await;
        state.require_product(id)?;
        state.require_categories(&category_ids)?;

        category_ids.sort();
        category_ids.dedup();
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        product.category_ids = category_ids;
        let product = product.clone();
        state.audit(id.as_i64(), audit);
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId, audit: AuditEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_product(id)?;
        if state.items.values().any(|i| i.product_id == id) {
            return Err(StoreError::Conflict(format!(
                "product {id} is referenced by order items"
            )));
        }
        state.products.remove(&id);
        state.audit(id.as_i64(), audit);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(
        &self,
        order: NewOrder,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<Order> {
        let mut state = self.state.write().await;

        // Validate everything before the first write.
        for line in &order.lines {
            state.require_product(line.product_id)?;
        }
        if stock == StockPolicy::Adjust {
            state.check_stock(&[], &order.lines)?;
            state.move_stock(&[], &order.lines);
        }

        let id = OrderId::new(next(&mut state.seq.order));
        let row = Order {
            id,
            customer_name: order.customer_name,
            shipping_address: order.shipping_address,
            total_amount: order.total_amount,
            user_id: order.user_id,
            items: Vec::new(),
            created_at: Utc::now(),
            deleted_at: None,
        };
        state.orders.insert(id, row.clone());
        state.insert_lines(id, order.lines);
        state.audit(id.as_i64(), audit);
        Ok(state.hydrate(&row, false))
    }

    async fn update_order(
        &self,
        id: OrderId,
        changes: OrderChanges,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        state.live_order(id)?;

        let current = state.items_of(id, false);
        if let Some(ref lines) = changes.lines {
            for line in lines {
                state.require_product(line.product_id)?;
            }
            if stock == StockPolicy::Adjust {
                state.check_stock(&current, lines)?;
            }
        }

        let row = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        if let Some(name) = changes.customer_name {
            row.customer_name = name;
        }
        if let Some(address) = changes.shipping_address {
            row.shipping_address = address;
        }
        if let Some(total) = changes.total_amount {
            row.total_amount = total;
        }
        let row = row.clone();

        if let Some(lines) = changes.lines {
            if stock == StockPolicy::Adjust {
                state.move_stock(&current, &lines);
            }
            state.items.retain(|_, item| item.order_id != id);
            state.insert_lines(id, lines);
        }

        state.audit(id.as_i64(), audit);
        Ok(state.hydrate(&row, false))
    }

    async fn soft_delete_order(
        &self,
        id: OrderId,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.live_order(id)?;

        let now = Utc::now();
        let live = state.items_of(id, false);
        if stock == StockPolicy::Adjust {
            state.move_stock(&live, &[]);
        }
        for item in state.items.values_mut() {
            if item.order_id == id && item.deleted_at.is_none() {
                item.deleted_at = Some(now);
            }
        }
        if let Some(row) = state.orders.get_mut(&id) {
            row.deleted_at = Some(now);
        }
        state.audit(id.as_i64(), audit);
        Ok(())
    }

    async fn find_order(&self, id: OrderId, include_deleted: bool) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .get(&id)
            .filter(|o| include_deleted || !o.is_deleted())
            .map(|o| state.hydrate(o, include_deleted)))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64)> {
        let state = self.state.read().await;
        let mut rows: Vec<Order> = state
            .orders
            .values()
            .filter(|o| query.include_deleted || !o.is_deleted())
            .filter(|o| {
                query
                    .customer_name
                    .as_deref()
                    .is_none_or(|name| o.customer_name == name)
            })
            .filter(|o| within(o.created_at, query.from, query.to))
            .cloned()
            .collect();
        newest_first(&mut rows);

        let (rows, total) = page_of(rows, query.page);
        let rows = rows
            .iter()
            .map(|o| state.hydrate(o, query.include_deleted))
            .collect();
        Ok((rows, total))
    }

    async fn orders_for_user(&self, user_id: UserId, include_deleted: bool) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut rows: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == Some(user_id) && (include_deleted || !o.is_deleted()))
            .map(|o| state.hydrate(o, include_deleted))
            .collect();
        newest_first(&mut rows);
        Ok(rows)
    }

    async fn create_order_item(
        &self,
        item: NewOrderItem,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<OrderItem> {
        let mut state = self.state.write().await;
        state.live_order(item.order_id)?;
        state.require_product(item.product_id)?;

        let id = OrderItemId::new(next(&mut state.seq.item));
        let item = OrderItem {
            id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
            deleted_at: None,
        };
        let mut new_totals = Vec::new();
        if totals == TotalPolicy::Recompute {
            let total = state.total_after(item.order_id, None, Some(&item))?;
            new_totals.push((item.order_id, total));
        }

        state.items.insert(id, item.clone());
        state.set_totals(new_totals);
        state.audit(id.as_i64(), audit);
        Ok(item)
    }

    async fn find_order_item(&self, id: OrderItemId) -> Result<Option<OrderItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .get(&id)
            .filter(|i| i.deleted_at.is_none())
            .cloned())
    }

    async fn list_order_items(&self, page: PageRequest) -> Result<(Vec<OrderItem>, u64)> {
        let state = self.state.read().await;
        let rows: Vec<OrderItem> = state
            .items
            .values()
            .filter(|i| i.deleted_at.is_none())
            .cloned()
            .collect();
        Ok(page_of(rows, page))
    }

    async fn update_order_item(
        &self,
        id: OrderItemId,
        changes: OrderItemChanges,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<OrderItem> {
        let mut state = self.state.write().await;
        let current = state
            .items
            .get(&id)
            .filter(|i| i.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| StoreError::not_found("OrderItem", id))?;
        if let Some(order_id) = changes.order_id {
            state.live_order(order_id)?;
        }
        if let Some(product_id) = changes.product_id {
            state.require_product(product_id)?;
        }

        let item = OrderItem {
            order_id: changes.order_id.unwrap_or(current.order_id),
            product_id: changes.product_id.unwrap_or(current.product_id),
            quantity: changes.quantity.unwrap_or(current.quantity),
            price: changes.price.unwrap_or(current.price),
            ..current.clone()
        };
        let mut new_totals = Vec::new();
        if totals == TotalPolicy::Recompute {
            let total = state.total_after(item.order_id, Some(id), Some(&item))?;
            new_totals.push((item.order_id, total));
            if current.order_id != item.order_id {
                let left = state.total_after(current.order_id, Some(id), None)?;
                new_totals.push((current.order_id, left));
            }
        }

        state.items.insert(id, item.clone());
        state.set_totals(new_totals);
        state.audit(id.as_i64(), audit);
        Ok(item)
    }

    async fn delete_order_item(
        &self,
        id: OrderItemId,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let order_id = state
            .items
            .get(&id)
            .filter(|i| i.deleted_at.is_none())
            .map(|i| i.order_id)
            .ok_or_else(|| StoreError::not_found("OrderItem", id))?;
        let mut new_totals = Vec::new();
        if totals == TotalPolicy::Recompute {
            let total = state.total_after(order_id, Some(id), None)?;
            new_totals.push((order_id, total));
        }

        state.items.remove(&id);
        state.set_totals(new_totals);
        state.audit(id.as_i64(), audit);
        Ok(())
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append_audit(&self, entity_id: i64, entry: AuditEntry) -> Result<AuditLog> {
        Ok(self.state.write().await.audit(entity_id, entry))
    }

    async fn query_audit_logs(&self, query: &AuditLogQuery) -> Result<(Vec<AuditLog>, u64)> {
        let state = self.state.read().await;
        let matches = |value: &str, filter: &Option<String>| {
            filter
                .as_deref()
                .is_none_or(|needle| contains_ignore_case(value, needle))
        };

        // Reverse insertion order first so equal timestamps stay newest-first
        // through the stable sort.
        let mut rows: Vec<AuditLog> = state
            .audit
            .iter()
            .rev()
            .filter(|log| {
                matches(&log.entity_name, &query.entity_name)
                    && matches(&log.action, &query.action)
                    && matches(
                        log.performed_by.as_deref().unwrap_or_default(),
                        &query.performed_by,
                    )
                    && (query.performed_by.is_none() || log.performed_by.is_some())
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(page_of(rows, query.page))
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn stock_levels(&self) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.stock.cmp(&b.stock).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn order_history(&self, query: &OrderHistoryQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut rows: Vec<Order> = state
            .orders
            .values()
            .filter(|o| query.include_deleted || !o.is_deleted())
            .filter(|o| within(o.created_at, query.from, query.to))
            .filter(|o| {
                query
                    .customer_name
                    .as_deref()
                    .is_none_or(|name| o.customer_name == name)
            })
            .filter(|o| query.min_total.is_none_or(|min| o.total_amount >= min))
            .filter(|o| query.max_total.is_none_or(|max| o.total_amount <= max))
            .map(|o| state.hydrate(o, query.include_deleted))
            .collect();
        newest_first(&mut rows);
        Ok(rows)
    }

    async fn order_summaries(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OrderSummary>> {
        let state = self.state.read().await;
        let mut rows: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| !o.is_deleted() && within(o.created_at, Some(from), Some(to)))
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows
            .into_iter()
            .map(|o| OrderSummary {
                customer_name: o.customer_name.clone(),
                total_amount: o.total_amount,
                created_at: o.created_at,
            })
            .collect())
    }

    async fn dashboard_counts(&self, low_stock_threshold: i64) -> Result<DashboardCounts> {
        let state = self.state.read().await;
        let live = state.orders.values().filter(|o| !o.is_deleted());
        Ok(DashboardCounts {
            total_products: state.products.len() as u64,
            total_categories: state.categories.len() as u64,
            total_orders: live.clone().count() as u64,
            total_revenue: live.map(|o| o.total_amount).sum(),
            low_stock_products: state
                .products
                .values()
                .filter(|p| p.stock < low_stock_threshold)
                .count() as u64,
        })
    }
}
