//! Integration tests for the order aggregate and its neighbours.
//!
//! These tests drive the services against the in-memory store and check the
//! aggregate guarantees: atomic writes, one audit record per mutation, full
//! replacement of lines, and uniform soft-delete filtering.

use common::{Money, OrderId, OrderItemId, PageRequest, ProductId, UserId};
use domain::{
    AuditService, CatalogService, CreateOrder, CreateOrderItem, CreateProduct, DomainError,
    OrderItemService, OrderPolicy, OrderService, UpdateOrder, UpdateOrderItem,
};
use store::{AuditLogQuery, InMemoryStore, OrderLine, OrderQuery};

/// Helper to create a catalog holding products with the given stock levels.
async fn seed_catalog(store: &InMemoryStore, stocks: &[i64]) -> Vec<ProductId> {
    let catalog = CatalogService::new(store.clone());
    let mut ids = Vec::new();
    for (i, stock) in stocks.iter().enumerate() {
        let product = catalog
            .create_product(
                CreateProduct {
                    name: format!("Product {i}"),
                    description: String::new(),
                    price: Money::from_units(50),
                    stock: *stock,
                    category_ids: vec![],
                },
                Some("admin"),
            )
            .await
            .unwrap();
        ids.push(product.id);
    }
    ids
}

fn line(product_id: ProductId, quantity: u32, units: i64) -> OrderLine {
    OrderLine {
        product_id,
        quantity,
        price: Money::from_units(units),
    }
}

fn john_doe(items: Vec<OrderLine>) -> CreateOrder {
    CreateOrder {
        customer_name: "John Doe".to_string(),
        shipping_address: "123 Main St".to_string(),
        total_amount: Money::from_units(100),
        items,
    }
}

async fn audit_rows(store: &InMemoryStore, entity: &str, action: &str) -> Vec<store::AuditLog> {
    let query = AuditLogQuery::new(PageRequest::new(Some(1), Some(100)))
        .entity_name(entity)
        .action(action);
    AuditService::new(store.clone())
        .get_audit_logs(&query)
        .await
        .unwrap()
        .data
        .into_iter()
        .filter(|log| log.entity_name == entity && log.action == action)
        .collect()
}

mod create_order {
    use super::*;

    #[tokio::test]
    async fn john_doe_scenario() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::new(store.clone());

        let order = service
            .create_order(
                john_doe(vec![line(products[0], 2, 50)]),
                Some(UserId::new(1)),
                Some("jane"),
            )
            .await
            .unwrap();

        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].price, Money::from_units(50));
        assert_eq!(order.total_amount, Money::from_units(100));
        assert_eq!(order.user_id, Some(UserId::new(1)));

        let audits = audit_rows(&store, "Order", "CREATE").await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].entity_id, order.id.as_i64());
        assert_eq!(audits[0].performed_by.as_deref(), Some("jane"));
        assert_eq!(audits[0].changes["customerName"], "John Doe");
    }

    #[tokio::test]
    async fn item_count_matches_input() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10, 10, 10]).await;
        let service = OrderService::new(store.clone());

        let lines: Vec<_> = products.iter().map(|p| line(*p, 1, 5)).collect();
        let order = service
            .create_order(john_doe(lines.clone()), None, None)
            .await
            .unwrap();

        assert_eq!(order.items.len(), lines.len());
        let reloaded = service.find_order(order.id, false).await.unwrap();
        assert_eq!(reloaded.items.len(), lines.len());
    }

    #[tokio::test]
    async fn missing_product_names_id_and_leaves_nothing() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::new(store.clone());
        let audits_before = store.audit_count().await;

        let err = service
            .create_order(
                john_doe(vec![line(products[0], 1, 50), line(ProductId::new(77), 1, 50)]),
                None,
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound(ref m) if m == "Product with id 77 not found"));
        let page = service.find_orders(&OrderQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(store.raw_items(OrderId::new(1)).await.is_empty());
        assert_eq!(store.audit_count().await, audits_before);
    }

    #[tokio::test]
    async fn validation_runs_before_store() {
        let store = InMemoryStore::new();
        let service = OrderService::new(store.clone());

        let mut input = john_doe(vec![line(ProductId::new(1), 0, 5)]);
        input.customer_name = String::new();

        let err = service.create_order(input, None, None).await.unwrap_err();
        let DomainError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(errors.messages().len(), 2);
        assert_eq!(store.audit_count().await, 0);
    }

    #[tokio::test]
    async fn client_total_kept_when_recompute_disabled() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::with_policy(
            store.clone(),
            OrderPolicy {
                recompute_total: false,
                adjust_stock: false,
            },
        );

        let mut input = john_doe(vec![line(products[0], 1, 50)]);
        input.total_amount = Money::from_units(1);
        let order = service.create_order(input, None, None).await.unwrap();
        assert_eq!(order.total_amount, Money::from_units(1));
    }

    #[tokio::test]
    async fn stock_adjustment_is_opt_in() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[3]).await;
        let catalog = CatalogService::new(store.clone());

        OrderService::new(store.clone())
            .create_order(john_doe(vec![line(products[0], 2, 50)]), None, None)
            .await
            .unwrap();
        assert_eq!(catalog.get_product(products[0]).await.unwrap().stock, 3);

        let adjusting = OrderService::with_policy(
            store.clone(),
            OrderPolicy {
                adjust_stock: true,
                ..Default::default()
            },
        );
        adjusting
            .create_order(john_doe(vec![line(products[0], 2, 50)]), None, None)
            .await
            .unwrap();
        assert_eq!(catalog.get_product(products[0]).await.unwrap().stock, 1);

        let err = adjusting
            .create_order(john_doe(vec![line(products[0], 2, 50)]), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}

mod update_order {
    use super::*;

    #[tokio::test]
    async fn items_are_fully_replaced() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10, 10]).await;
        let service = OrderService::new(store.clone());
        let order = service
            .create_order(
                john_doe(vec![line(products[0], 1, 10), line(products[0], 2, 10)]),
                None,
                None,
            )
            .await
            .unwrap();
        let old_ids: Vec<OrderItemId> = order.items.iter().map(|i| i.id).collect();

        let updated = service
            .update_order(
                order.id,
                UpdateOrder {
                    items: Some(vec![line(products[1], 4, 25)]),
                    ..Default::default()
                },
                Some("admin"),
            )
            .await
            .unwrap();

        assert_eq!(updated.items.len(), 1);
        assert_eq!(updated.items[0].product_id, products[1]);
        assert_eq!(updated.total_amount, Money::from_units(100));
        assert_eq!(updated.customer_name, "John Doe");

        let raw = store.raw_items(order.id).await;
        assert!(raw.iter().all(|item| !old_ids.contains(&item.id)));
        assert_eq!(audit_rows(&store, "Order", "UPDATE").await.len(), 1);
    }

    #[tokio::test]
    async fn scalar_patch_keeps_items_and_total() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::new(store.clone());
        let order = service
            .create_order(john_doe(vec![line(products[0], 2, 50)]), None, None)
            .await
            .unwrap();

        let updated = service
            .update_order(
                order.id,
                UpdateOrder {
                    shipping_address: Some("9 Elm St".to_string()),
                    total_amount: Some(Money::zero()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(updated.shipping_address, "9 Elm St");
        assert_eq!(updated.items, order.items);
        assert_eq!(updated.total_amount, Money::from_units(100));
    }

    #[tokio::test]
    async fn explicit_zero_total_applies_when_client_authoritative() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::with_policy(
            store.clone(),
            OrderPolicy {
                recompute_total: false,
                adjust_stock: false,
            },
        );
        let order = service
            .create_order(john_doe(vec![line(products[0], 2, 50)]), None, None)
            .await
            .unwrap();

        let updated = service
            .update_order(
                order.id,
                UpdateOrder {
                    total_amount: Some(Money::zero()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated.total_amount, Money::zero());
    }

    #[tokio::test]
    async fn empty_items_clears_lines() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::new(store.clone());
        let order = service
            .create_order(john_doe(vec![line(products[0], 2, 50)]), None, None)
            .await
            .unwrap();

        let updated = service
            .update_order(
                order.id,
                UpdateOrder {
                    items: Some(vec![]),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert!(updated.items.is_empty());
        assert_eq!(updated.total_amount, Money::zero());
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let service = OrderService::new(InMemoryStore::new());
        let err = service
            .update_order(OrderId::new(5), UpdateOrder::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(ref m) if m == "Order with id 5 not found"));
    }
}

mod remove_order {
    use super::*;

    #[tokio::test]
    async fn removed_order_is_hidden_everywhere_by_default() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::new(store.clone());
        let order = service
            .create_order(
                john_doe(vec![line(products[0], 1, 50)]),
                Some(UserId::new(3)),
                None,
            )
            .await
            .unwrap();

        service.remove_order(order.id, Some("admin")).await.unwrap();

        let page = service.find_orders(&OrderQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(matches!(
            service.find_order(order.id, false).await,
            Err(DomainError::NotFound(_))
        ));
        assert!(
            service
                .find_orders_by_user(UserId::new(3), false)
                .await
                .unwrap()
                .is_empty()
        );

        let deleted = service.find_order(order.id, true).await.unwrap();
        assert!(deleted.is_deleted());
        assert!(deleted.items.iter().all(|i| i.deleted_at.is_some()));

        let audits = audit_rows(&store, "Order", "DELETE").await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].changes["id"], order.id.as_i64());
    }

    #[tokio::test]
    async fn second_remove_is_not_found() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::new(store.clone());
        let order = service
            .create_order(john_doe(vec![line(products[0], 1, 50)]), None, None)
            .await
            .unwrap();

        service.remove_order(order.id, None).await.unwrap();
        let err = service.remove_order(order.id, None).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
        assert_eq!(audit_rows(&store, "Order", "DELETE").await.len(), 1);
    }

    #[tokio::test]
    async fn remove_returns_stock_when_adjusting() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[5]).await;
        let service = OrderService::with_policy(
            store.clone(),
            OrderPolicy {
                adjust_stock: true,
                ..Default::default()
            },
        );
        let order = service
            .create_order(john_doe(vec![line(products[0], 5, 50)]), None, None)
            .await
            .unwrap();
        service.remove_order(order.id, None).await.unwrap();

        let product = CatalogService::new(store.clone())
            .get_product(products[0])
            .await
            .unwrap();
        assert_eq!(product.stock, 5);
    }
}

mod find_orders {
    use chrono::{Duration, Utc};

    use super::*;

    #[tokio::test]
    async fn empty_table_has_zero_pages() {
        let service = OrderService::new(InMemoryStore::new());
        let page = service
            .find_orders(&OrderQuery::new(PageRequest::new(Some(1), Some(10))))
            .await
            .unwrap();

        assert!(page.orders.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[tokio::test]
    async fn customer_filter_and_page_count() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::new(store.clone());
        for name in ["Ann", "Bob", "Ann", "Ann"] {
            let mut input = john_doe(vec![line(products[0], 1, 5)]);
            input.customer_name = name.to_string();
            service.create_order(input, None, None).await.unwrap();
        }

        let query = OrderQuery::new(PageRequest::new(Some(2), Some(2))).customer_name("Ann");
        let page = service.find_orders(&query).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.orders.len(), 1);
    }

    #[tokio::test]
    async fn single_date_bound_filters() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;
        let service = OrderService::new(store.clone());
        service
            .create_order(john_doe(vec![line(products[0], 1, 5)]), None, None)
            .await
            .unwrap();

        let future = OrderQuery::default().from(Utc::now() + Duration::minutes(5));
        assert_eq!(service.find_orders(&future).await.unwrap().total, 0);

        let past = OrderQuery::default().to(Utc::now() - Duration::minutes(5));
        assert_eq!(service.find_orders(&past).await.unwrap().total, 0);

        let open = OrderQuery::default().from(Utc::now() - Duration::minutes(5));
        assert_eq!(service.find_orders(&open).await.unwrap().total, 1);
    }
}

mod order_items {
    use super::*;

    async fn setup() -> (InMemoryStore, Vec<ProductId>, OrderId) {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10, 10]).await;
        let order = OrderService::new(store.clone())
            .create_order(john_doe(vec![line(products[0], 1, 50)]), None, None)
            .await
            .unwrap();
        (store, products, order.id)
    }

    #[tokio::test]
    async fn create_requires_order_and_product() {
        let (store, products, order_id) = setup().await;
        let service = OrderItemService::new(store.clone());

        let err = service
            .create(
                CreateOrderItem {
                    order_id: OrderId::new(999),
                    product_id: products[0],
                    quantity: 1,
                    price: Money::from_units(1),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(ref m) if m.starts_with("Order ")));

        let err = service
            .create(
                CreateOrderItem {
                    order_id,
                    product_id: ProductId::new(999),
                    quantity: 1,
                    price: Money::from_units(1),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(ref m) if m.starts_with("Product ")));

        let item = service
            .create(
                CreateOrderItem {
                    order_id,
                    product_id: products[1],
                    quantity: 3,
                    price: Money::from_units(2),
                },
                Some("admin"),
            )
            .await
            .unwrap();
        assert_eq!(item.order_id, order_id);
        assert_eq!(audit_rows(&store, "OrderItem", "CREATE").await.len(), 1);
    }

    #[tokio::test]
    async fn update_re_resolves_only_present_ids() {
        let (store, products, _) = setup().await;
        let service = OrderItemService::new(store.clone());
        let item = service
            .find_all(PageRequest::default())
            .await
            .unwrap()
            .data
            .remove(0);

        let updated = service
            .update(
                item.id,
                UpdateOrderItem {
                    quantity: Some(7),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated.quantity, 7);
        assert_eq!(updated.product_id, products[0]);

        let err = service
            .update(
                item.id,
                UpdateOrderItem {
                    product_id: Some(ProductId::new(404)),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(ref m) if m == "Product with id 404 not found"));
    }

    #[tokio::test]
    async fn remove_is_hard_delete() {
        let (store, _, _) = setup().await;
        let service = OrderItemService::new(store.clone());
        let item = service
            .find_all(PageRequest::default())
            .await
            .unwrap()
            .data
            .remove(0);

        service.remove(item.id, None).await.unwrap();

        assert!(matches!(
            service.find_one(item.id).await,
            Err(DomainError::NotFound(_))
        ));
        assert!(store.raw_items(item.order_id).await.is_empty());
        assert!(matches!(
            service.remove(item.id, None).await,
            Err(DomainError::NotFound(_))
        ));
        assert_eq!(audit_rows(&store, "OrderItem", "DELETE").await.len(), 1);
    }

    async fn total_of(store: &InMemoryStore, order_id: OrderId) -> Money {
        OrderService::new(store.clone())
            .find_order(order_id, false)
            .await
            .unwrap()
            .total_amount
    }

    #[tokio::test]
    async fn line_writes_refresh_the_order_total() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10, 10]).await;
        let orders = OrderService::new(store.clone());
        let order = orders
            .create_order(john_doe(vec![line(products[0], 2, 50)]), None, None)
            .await
            .unwrap();
        let other = orders
            .create_order(john_doe(vec![line(products[1], 1, 50)]), None, None)
            .await
            .unwrap();
        assert_eq!(order.total_amount, Money::from_units(100));

        let service = OrderItemService::new(store.clone());
        let item = service
            .create(
                CreateOrderItem {
                    order_id: order.id,
                    product_id: products[1],
                    quantity: 3,
                    price: Money::from_units(50),
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(total_of(&store, order.id).await, Money::from_units(250));

        service
            .update(
                item.id,
                UpdateOrderItem {
                    order_id: Some(other.id),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(total_of(&store, order.id).await, Money::from_units(100));
        assert_eq!(total_of(&store, other.id).await, Money::from_units(200));

        service.remove(item.id, None).await.unwrap();
        assert_eq!(total_of(&store, other.id).await, Money::from_units(50));
    }

    #[tokio::test]
    async fn claimed_totals_survive_line_writes() {
        let (store, products, order_id) = setup().await;
        let policy = OrderPolicy {
            recompute_total: false,
            ..OrderPolicy::default()
        };
        let before = total_of(&store, order_id).await;

        OrderItemService::with_policy(store.clone(), policy)
            .create(
                CreateOrderItem {
                    order_id,
                    product_id: products[1],
                    quantity: 3,
                    price: Money::from_units(50),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(total_of(&store, order_id).await, before);
    }

    #[tokio::test]
    async fn line_pushing_the_total_out_of_range_is_rejected() {
        let (store, products, order_id) = setup().await;
        let service = OrderItemService::new(store.clone());

        let err = service
            .create(
                CreateOrderItem {
                    order_id,
                    product_id: products[1],
                    quantity: 1,
                    price: Money::from_cents(i64::MAX),
                },
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(store.raw_items(order_id).await.len(), 1);
        assert_eq!(total_of(&store, order_id).await, Money::from_units(50));
    }
}

mod money_range {
    use super::*;

    #[tokio::test]
    async fn order_total_beyond_the_cent_range_is_a_validation_error() {
        let store = InMemoryStore::new();
        let products = seed_catalog(&store, &[10]).await;

        let err = OrderService::new(store.clone())
            .create_order(
                john_doe(vec![
                    OrderLine {
                        product_id: products[0],
                        quantity: 1,
                        price: Money::from_cents(i64::MAX),
                    },
                    line(products[0], 1, 1),
                ]),
                None,
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
    }
}
