use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CategoryId, Money, OrderId, OrderItemId, PageRequest, ProductId, Role, UserId};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use crate::query::like_pattern;
use crate::{
    AuditEntry, AuditLog, AuditLogQuery, AuditStore, Category, CatalogStore, DashboardCounts,
    NewOrder, NewOrderItem, NewProduct, NewUser, Order, OrderChanges, OrderHistoryQuery,
    OrderItem, OrderItemChanges, OrderLine, OrderQuery, OrderStore, OrderSummary, Product,
    ProductChanges, ProductQuery, ReportStore, Result, StockPolicy, StoreError, TotalPolicy, User,
    UserChanges, UserStore,
};

const USER_COLUMNS: &str = "id, username, password_hash, role, created_at";
const PRODUCT_COLUMNS: &str = "id, name, description, price_cents, stock";
const ORDER_COLUMNS: &str =
    "id, customer_name, shipping_address, total_amount_cents, user_id, created_at, deleted_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, price_cents, deleted_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: UserId::new(row.try_get("id")?),
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            role: role
                .parse::<Role>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_category(row: PgRow) -> Result<Category> {
        Ok(Category {
            id: CategoryId::new(row.try_get("id")?),
            name: row.try_get("name")?,
        })
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: row.try_get("stock")?,
            category_ids: Vec::new(),
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            customer_name: row.try_get("customer_name")?,
            shipping_address: row.try_get("shipping_address")?,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
            items: Vec::new(),
            created_at: row.try_get("created_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i64 = row.try_get("quantity")?;
        Ok(OrderItem {
            id: OrderItemId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|e| StoreError::Corrupt(format!("quantity {quantity}: {e}")))?,
            price: Money::from_cents(row.try_get("price_cents")?),
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn row_to_audit(row: PgRow) -> Result<AuditLog> {
        Ok(AuditLog {
            id: row.try_get("id")?,
            entity_name: row.try_get("entity_name")?,
            entity_id: row.try_get("entity_id")?,
            action: row.try_get("action")?,
            changes: row.try_get("changes")?,
            performed_by: row.try_get("performed_by")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

/// SQLSTATE for a value outside its column's range.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Maps constraint violations and out-of-range values to
/// [`StoreError::Conflict`].
fn write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE))
    {
        return StoreError::Conflict(db_err.message().to_string());
    }
    StoreError::Database(e)
}

async fn insert_audit(
    conn: &mut PgConnection,
    entity_id: i64,
    entry: AuditEntry,
) -> Result<AuditLog> {
    let log = AuditLog::from_entry(entity_id, entry);
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, entity_name, entity_id, action, changes, performed_by, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(log.id)
    .bind(&log.entity_name)
    .bind(log.entity_id)
    .bind(&log.action)
    .bind(&log.changes)
    .bind(&log.performed_by)
    .bind(log.timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(log)
}

/// Fails with `NotFound` naming the first id (in request order) that has no row.
async fn ensure_ids_exist(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    ids: &[i64],
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let sql = format!("SELECT id FROM {table} WHERE id = ANY($1)");
    let found: Vec<i64> = sqlx::query_scalar(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
    match ids.iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(StoreError::not_found(entity, *missing)),
        None => Ok(()),
    }
}

async fn load_category_ids(
    conn: &mut PgConnection,
    product_ids: &[i64],
) -> Result<HashMap<i64, Vec<CategoryId>>> {
    let rows = sqlx::query(
        r#"
        SELECT product_id, category_id
        FROM product_categories
        WHERE product_id = ANY($1)
        ORDER BY category_id ASC
        "#,
    )
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut map: HashMap<i64, Vec<CategoryId>> = HashMap::new();
    for row in rows {
        let product_id: i64 = row.try_get("product_id")?;
        map.entry(product_id)
            .or_default()
            .push(CategoryId::new(row.try_get("category_id")?));
    }
    Ok(map)
}

async fn products_with_categories(
    conn: &mut PgConnection,
    rows: Vec<PgRow>,
) -> Result<Vec<Product>> {
    let mut products = rows
        .iter()
        .map(PostgresStore::row_to_product)
        .collect::<Result<Vec<_>>>()?;
    let ids: Vec<i64> = products.iter().map(|p| p.id.as_i64()).collect();
    let mut categories = load_category_ids(conn, &ids).await?;
    for product in &mut products {
        product.category_ids = categories.remove(&product.id.as_i64()).unwrap_or_default();
    }
    Ok(products)
}

async fn load_product(conn: &mut PgConnection, id: ProductId) -> Result<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(products_with_categories(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

async fn link_categories(
    conn: &mut PgConnection,
    product_id: ProductId,
    category_ids: &[CategoryId],
) -> Result<()> {
    let ids: Vec<i64> = category_ids.iter().map(CategoryId::as_i64).collect();
    sqlx::query(
        r#"
        INSERT INTO product_categories (product_id, category_id)
        SELECT $1, UNNEST($2::BIGINT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(product_id.as_i64())
    .bind(ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn load_items(
    conn: &mut PgConnection,
    order_ids: &[i64],
    include_deleted: bool,
) -> Result<HashMap<i64, Vec<OrderItem>>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM order_items \
         WHERE order_id = ANY($1) AND ($2 OR deleted_at IS NULL) ORDER BY id ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(order_ids)
        .bind(include_deleted)
        .fetch_all(&mut *conn)
        .await?;

    let mut map: HashMap<i64, Vec<OrderItem>> = HashMap::new();
    for row in &rows {
        let item = PostgresStore::row_to_item(row)?;
        map.entry(item.order_id.as_i64()).or_default().push(item);
    }
    Ok(map)
}

async fn orders_with_items(
    conn: &mut PgConnection,
    rows: Vec<PgRow>,
    include_deleted: bool,
) -> Result<Vec<Order>> {
    let mut orders = rows
        .iter()
        .map(PostgresStore::row_to_order)
        .collect::<Result<Vec<_>>>()?;
    let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
    let mut items = load_items(conn, &ids, include_deleted).await?;
    for order in &mut orders {
        order.items = items.remove(&order.id.as_i64()).unwrap_or_default();
    }
    Ok(orders)
}

async fn lock_live_order(conn: &mut PgConnection, id: OrderId) -> Result<Order> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
    );
    let row = sqlx::query(&sql)
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("Order", id))?;
    PostgresStore::row_to_order(&row)
}

/// Sets each order's total to the sum of its live lines.
async fn refresh_totals(conn: &mut PgConnection, order_ids: &[i64]) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE orders o SET total_amount_cents = COALESCE((
            SELECT SUM(i.quantity::NUMERIC * i.price_cents)
            FROM order_items i
            WHERE i.order_id = o.id AND i.deleted_at IS NULL
        ), 0)::BIGINT
        WHERE o.id = ANY($1)
        "#,
    )
    .bind(order_ids)
    .execute(&mut *conn)
    .await
    .map_err(write_error)?;
    Ok(())
}

async fn insert_lines(
    conn: &mut PgConnection,
    order_id: OrderId,
    lines: &[OrderLine],
) -> Result<()> {
    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, quantity, price_cents)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order_id.as_i64())
        .bind(line.product_id.as_i64())
        .bind(i64::from(line.quantity))
        .bind(line.price.cents())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Returns the quantities in `credit` to stock and takes those in `debit`,
/// failing with `Conflict` when a product would go negative.
async fn move_stock(
    conn: &mut PgConnection,
    credit: &[OrderItem],
    debit: &[OrderLine],
) -> Result<()> {
    let mut net: HashMap<ProductId, i64> = HashMap::new();
    for item in credit {
        *net.entry(item.product_id).or_default() -= i64::from(item.quantity);
    }
    for line in debit {
        *net.entry(line.product_id).or_default() += i64::from(line.quantity);
    }

    let mut deltas: Vec<(ProductId, i64)> = net.into_iter().filter(|(_, d)| *d != 0).collect();
    // Fixed lock order across concurrent writers.
    deltas.sort_by_key(|(id, _)| *id);

    for (product_id, delta) in deltas {
        let updated = sqlx::query(
            "UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock - $2 >= 0",
        )
        .bind(product_id.as_i64())
        .bind(delta)
        .execute(&mut *conn)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "insufficient stock for product {product_id}"
            )));
        }
    }
    Ok(())
}

fn push_order_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    customer_name: Option<&str>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    include_deleted: bool,
) {
    if !include_deleted {
        qb.push(" AND deleted_at IS NULL");
    }
    if let Some(name) = customer_name {
        qb.push(" AND customer_name = ").push_bind(name.to_string());
    }
    if let Some(from) = from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &AuditLogQuery) {
    if let Some(ref value) = query.entity_name {
        qb.push(" AND entity_name ILIKE ").push_bind(like_pattern(value));
    }
    if let Some(ref value) = query.action {
        qb.push(" AND action ILIKE ").push_bind(like_pattern(value));
    }
    if let Some(ref value) = query.performed_by {
        qb.push(" AND performed_by ILIKE ").push_bind(like_pattern(value));
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: PageRequest) {
    qb.push(" LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn insert_user(&self, user: NewUser, audit: AuditEntry) -> Result<User> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(write_error)?;
        let user = Self::row_to_user(row)?;
        insert_audit(&mut tx, user.id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_user).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_user).transpose()
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: UserChanges,
        audit: AuditEntry,
    ) -> Result<User> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                password_hash = COALESCE($3, password_hash)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(changes.username)
            .bind(changes.password_hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(write_error)?
            .ok_or_else(|| StoreError::not_found("User", id))?;
        let user = Self::row_to_user(row)?;
        insert_audit(&mut tx, id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(user)
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn insert_category(&self, name: String, audit: AuditEntry) -> Result<Category> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("INSERT INTO categories (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;
        let category = Self::row_to_category(row)?;
        insert_audit(&mut tx, category.id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_category).collect()
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT id, name FROM categories WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_category).transpose()
    }

    async fn rename_category(
        &self,
        id: CategoryId,
        name: String,
        audit: AuditEntry,
    ) -> Result<Category> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("UPDATE categories SET name = $2 WHERE id = $1 RETURNING id, name")
            .bind(id.as_i64())
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("Category", id))?;
        let category = Self::row_to_category(row)?;
        insert_audit(&mut tx, id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(category)
    }

    async fn delete_category(&self, id: CategoryId, audit: AuditEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found("Category", id));
        }
        insert_audit(&mut tx, id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_product(&self, product: NewProduct, audit: AuditEntry) -> Result<Product> {
        let mut tx = self.pool.begin().await?;
        let category_ids: Vec<i64> = product.category_ids.iter().map(CategoryId::as_i64).collect();
        ensure_ids_exist(&mut tx, "categories", "Category", &category_ids).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (name, description, price_cents, stock)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.stock)
        .fetch_one(&mut *tx)
        .await?;
        let id = ProductId::new(id);
        link_categories(&mut tx, id, &product.category_ids).await?;
        insert_audit(&mut tx, id.as_i64(), audit).await?;

        let product = load_product(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        tx.commit().await?;
        Ok(product)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        let mut conn = self.pool.acquire().await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products WHERE 1=1");
        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE 1=1"
        ));
        if let Some(ref search) = query.search {
            count.push(" AND name ILIKE ").push_bind(like_pattern(search));
            select.push(" AND name ILIKE ").push_bind(like_pattern(search));
        }
        select.push(" ORDER BY id ASC");
        push_page(&mut select, query.page);

        let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;
        let rows = select.build().fetch_all(&mut *conn).await?;
        let products = products_with_categories(&mut conn, rows).await?;
        Ok((products, total as u64))
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        load_product(&mut conn, id).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
        audit: AuditEntry,
    ) -> Result<Product> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                stock = COALESCE($5, stock)
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.price.map(|p| p.cents()))
        .bind(changes.stock)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        insert_audit(&mut tx, id.as_i64(), audit).await?;
        let product = load_product(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        tx.commit().await?;
        Ok(product)
    }

    async fn set_product_categories(
        &self,
        id: ProductId,
        category_ids: Vec<CategoryId>,
        audit: AuditEntry,
    ) -> Result<Product> {
        let mut tx = self.pool.begin().await?;
        ensure_ids_exist(&mut tx, "products", "Product", &[id.as_i64()]).await?;
        let raw: Vec<i64> = category_ids.iter().map(CategoryId::as_i64).collect();
        ensure_ids_exist(&mut tx, "categories", "Category", &raw).await?;

        sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;
        link_categories(&mut tx, id, &category_ids).await?;
        insert_audit(&mut tx, id.as_i64(), audit).await?;

        let product = load_product(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        tx.commit().await?;
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId, audit: AuditEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        insert_audit(&mut tx, id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_order(
        &self,
        order: NewOrder,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let product_ids: Vec<i64> = order.lines.iter().map(|l| l.product_id.as_i64()).collect();
        ensure_ids_exist(&mut tx, "products", "Product", &product_ids).await?;
        if stock == StockPolicy::Adjust {
            move_stock(&mut tx, &[], &order.lines).await?;
        }

        let sql = format!(
            r#"
            INSERT INTO orders (customer_name, shipping_address, total_amount_cents, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&order.customer_name)
            .bind(&order.shipping_address)
            .bind(order.total_amount.cents())
            .bind(order.user_id.map(|u| u.as_i64()))
            .fetch_one(&mut *tx)
            .await
            .map_err(write_error)?;
        let mut created = Self::row_to_order(&row)?;

        insert_lines(&mut tx, created.id, &order.lines).await?;
        insert_audit(&mut tx, created.id.as_i64(), audit).await?;
        created.items = load_items(&mut tx, &[created.id.as_i64()], false)
            .await?
            .remove(&created.id.as_i64())
            .unwrap_or_default();

        tx.commit().await?;
        Ok(created)
    }

    async fn update_order(
        &self,
        id: OrderId,
        changes: OrderChanges,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        lock_live_order(&mut tx, id).await?;

        if let Some(ref lines) = changes.lines {
            let product_ids: Vec<i64> = lines.iter().map(|l| l.product_id.as_i64()).collect();
            ensure_ids_exist(&mut tx, "products", "Product", &product_ids).await?;
            if stock == StockPolicy::Adjust {
                let current = load_items(&mut tx, &[id.as_i64()], false)
                    .await?
                    .remove(&id.as_i64())
                    .unwrap_or_default();
                move_stock(&mut tx, &current, lines).await?;
            }
        }

        let sql = format!(
            r#"
            UPDATE orders SET
                customer_name = COALESCE($2, customer_name),
                shipping_address = COALESCE($3, shipping_address),
                total_amount_cents = COALESCE($4, total_amount_cents)
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(changes.customer_name)
            .bind(changes.shipping_address)
            .bind(changes.total_amount.map(|t| t.cents()))
            .fetch_one(&mut *tx)
            .await?;
        let mut updated = Self::row_to_order(&row)?;

        if let Some(ref lines) = changes.lines {
            sqlx::query("DELETE FROM order_items WHERE order_id = $1")
                .bind(id.as_i64())
                .execute(&mut *tx)
                .await?;
            insert_lines(&mut tx, id, lines).await?;
        }

        insert_audit(&mut tx, id.as_i64(), audit).await?;
        updated.items = load_items(&mut tx, &[id.as_i64()], false)
            .await?
            .remove(&id.as_i64())
            .unwrap_or_default();

        tx.commit().await?;
        Ok(updated)
    }

    async fn soft_delete_order(
        &self,
        id: OrderId,
        stock: StockPolicy,
        audit: AuditEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_live_order(&mut tx, id).await?;

        if stock == StockPolicy::Adjust {
            let live = load_items(&mut tx, &[id.as_i64()], false)
                .await?
                .remove(&id.as_i64())
                .unwrap_or_default();
            move_stock(&mut tx, &live, &[]).await?;
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE order_items SET deleted_at = $2 WHERE order_id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_i64())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE orders SET deleted_at = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        insert_audit(&mut tx, id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: OrderId, include_deleted: bool) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND ($2 OR deleted_at IS NULL)"
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(include_deleted)
            .fetch_all(&mut *conn)
            .await?;
        Ok(orders_with_items(&mut conn, rows, include_deleted)
            .await?
            .pop())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64)> {
        let mut conn = self.pool.acquire().await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        push_order_filters(
            &mut count,
            query.customer_name.as_deref(),
            query.from,
            query.to,
            query.include_deleted,
        );
        let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1"));
        push_order_filters(
            &mut select,
            query.customer_name.as_deref(),
            query.from,
            query.to,
            query.include_deleted,
        );
        select.push(" ORDER BY created_at DESC, id DESC");
        push_page(&mut select, query.page);
        let rows = select.build().fetch_all(&mut *conn).await?;

        let orders = orders_with_items(&mut conn, rows, query.include_deleted).await?;
        Ok((orders, total as u64))
    }

    async fn orders_for_user(&self, user_id: UserId, include_deleted: bool) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE user_id = $1 AND ($2 OR deleted_at IS NULL) \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_i64())
            .bind(include_deleted)
            .fetch_all(&mut *conn)
            .await?;
        orders_with_items(&mut conn, rows, include_deleted).await
    }

    async fn create_order_item(
        &self,
        item: NewOrderItem,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<OrderItem> {
        let mut tx = self.pool.begin().await?;
        lock_live_order(&mut tx, item.order_id).await?;
        ensure_ids_exist(&mut tx, "products", "Product", &[item.product_id.as_i64()]).await?;

        let sql = format!(
            r#"
            INSERT INTO order_items (order_id, product_id, quantity, price_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(item.order_id.as_i64())
            .bind(item.product_id.as_i64())
            .bind(i64::from(item.quantity))
            .bind(item.price.cents())
            .fetch_one(&mut *tx)
            .await?;
        let created = Self::row_to_item(&row)?;
        if totals == TotalPolicy::Recompute {
            refresh_totals(&mut tx, &[created.order_id.as_i64()]).await?;
        }
        insert_audit(&mut tx, created.id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_order_item(&self, id: OrderItemId) -> Result<Option<OrderItem>> {
        let sql =
            format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn list_order_items(&self, page: PageRequest) -> Result<(Vec<OrderItem>, u64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE deleted_at IS NULL \
             ORDER BY id ASC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(page.limit))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total as u64))
    }

    async fn update_order_item(
        &self,
        id: OrderItemId,
        changes: OrderItemChanges,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<OrderItem> {
        let mut tx = self.pool.begin().await?;
        let previous_order: i64 = sqlx::query_scalar(
            "SELECT order_id FROM order_items WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("OrderItem", id))?;
        if let Some(order_id) = changes.order_id {
            lock_live_order(&mut tx, order_id).await?;
        }
        if let Some(product_id) = changes.product_id {
            ensure_ids_exist(&mut tx, "products", "Product", &[product_id.as_i64()]).await?;
        }

        let sql = format!(
            r#"
            UPDATE order_items SET
                order_id = COALESCE($2, order_id),
                product_id = COALESCE($3, product_id),
                quantity = COALESCE($4, quantity),
                price_cents = COALESCE($5, price_cents)
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(changes.order_id.map(|o| o.as_i64()))
            .bind(changes.product_id.map(|p| p.as_i64()))
            .bind(changes.quantity.map(i64::from))
            .bind(changes.price.map(|p| p.cents()))
            .fetch_one(&mut *tx)
            .await?;
        let updated = Self::row_to_item(&row)?;
        if totals == TotalPolicy::Recompute {
            refresh_totals(&mut tx, &[previous_order, updated.order_id.as_i64()]).await?;
        }
        insert_audit(&mut tx, id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_order_item(
        &self,
        id: OrderItemId,
        totals: TotalPolicy,
        audit: AuditEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let order_id: i64 = sqlx::query_scalar(
            "DELETE FROM order_items WHERE id = $1 AND deleted_at IS NULL RETURNING order_id",
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("OrderItem", id))?;
        if totals == TotalPolicy::Recompute {
            refresh_totals(&mut tx, &[order_id]).await?;
        }
        insert_audit(&mut tx, id.as_i64(), audit).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn append_audit(&self, entity_id: i64, entry: AuditEntry) -> Result<AuditLog> {
        let mut conn = self.pool.acquire().await?;
        insert_audit(&mut conn, entity_id, entry).await
    }

    async fn query_audit_logs(&self, query: &AuditLogQuery) -> Result<(Vec<AuditLog>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs WHERE 1=1");
        push_audit_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT id, entity_name, entity_id, action, changes, performed_by, timestamp \
             FROM audit_logs WHERE 1=1",
        );
        push_audit_filters(&mut select, query);
        select.push(" ORDER BY timestamp DESC, seq DESC");
        push_page(&mut select, query.page);
        let rows = select.build().fetch_all(&self.pool).await?;

        let logs = rows
            .into_iter()
            .map(Self::row_to_audit)
            .collect::<Result<Vec<_>>>()?;
        Ok((logs, total as u64))
    }
}

#[async_trait]
impl ReportStore for PostgresStore {
    async fn stock_levels(&self) -> Result<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY stock ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
        products_with_categories(&mut conn, rows).await
    }

    async fn order_history(&self, query: &OrderHistoryQuery) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1"));
        push_order_filters(
            &mut select,
            query.customer_name.as_deref(),
            query.from,
            query.to,
            query.include_deleted,
        );
        if let Some(min) = query.min_total {
            select.push(" AND total_amount_cents >= ").push_bind(min.cents());
        }
        if let Some(max) = query.max_total {
            select.push(" AND total_amount_cents <= ").push_bind(max.cents());
        }
        select.push(" ORDER BY created_at DESC, id DESC");
        let rows = select.build().fetch_all(&mut *conn).await?;
        orders_with_items(&mut conn, rows, query.include_deleted).await
    }

    async fn order_summaries(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OrderSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT customer_name, total_amount_cents, created_at
            FROM orders
            WHERE deleted_at IS NULL AND created_at >= $1 AND created_at <= $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderSummary {
                    customer_name: row.try_get("customer_name")?,
                    total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn dashboard_counts(&self, low_stock_threshold: i64) -> Result<DashboardCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM products) AS total_products,
                (SELECT COUNT(*) FROM categories) AS total_categories,
                (SELECT COUNT(*) FROM orders WHERE deleted_at IS NULL) AS total_orders,
                (SELECT COALESCE(SUM(total_amount_cents), 0)::BIGINT
                    FROM orders WHERE deleted_at IS NULL) AS total_revenue_cents,
                (SELECT COUNT(*) FROM products WHERE stock < $1) AS low_stock_products
            "#,
        )
        .bind(low_stock_threshold)
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<u64> { Ok(row.try_get::<i64, _>(column)? as u64) };
        Ok(DashboardCounts {
            total_products: count("total_products")?,
            total_categories: count("total_categories")?,
            total_orders: count("total_orders")?,
            total_revenue: Money::from_cents(row.try_get("total_revenue_cents")?),
            low_stock_products: count("low_stock_products")?,
        })
    }
}
