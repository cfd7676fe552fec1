//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::config::Config;
use api::rate_limit::{RateLimiter, SlidingWindowLimiter};
use api::{AppState, create_app};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::Money;
use domain::{CreateProduct, Credentials};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn generous_limiter() -> Arc<dyn RateLimiter> {
    Arc::new(SlidingWindowLimiter::new(10_000, Duration::from_secs(600)))
}

fn credentials(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }
}

/// A running app with one admin, one user and one product (id 1).
struct TestApp {
    app: axum::Router,
    admin_token: String,
    user_token: String,
}

async fn setup() -> TestApp {
    let config = Config::default();
    let state = Arc::new(AppState::new(InMemoryStore::new(), &config));

    state
        .users
        .seed_admin(credentials("admin", "admin-password"))
        .await
        .unwrap();
    state
        .users
        .register(credentials("jane", "jane-password"))
        .await
        .unwrap();
    state
        .catalog
        .create_product(
            CreateProduct {
                name: "Widget".to_string(),
                description: String::new(),
                price: Money::from_units(50),
                stock: 20,
                category_ids: vec![],
            },
            None,
        )
        .await
        .unwrap();

    let admin_token = state
        .users
        .login(credentials("admin", "admin-password"))
        .await
        .unwrap()
        .access_token;
    let user_token = state
        .users
        .login(credentials("jane", "jane-password"))
        .await
        .unwrap()
        .access_token;

    TestApp {
        app: create_app(state, get_metrics_handle(), generous_limiter()),
        admin_token,
        user_token,
    }
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn john_doe() -> Value {
    json!({
        "customerName": "John Doe",
        "shippingAddress": "123 Main St",
        "totalAmount": 100.00,
        "items": [{ "productId": 1, "quantity": 2, "price": 50.00 }]
    })
}

mod public {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let t = setup().await;
        let (status, json) = send(&t.app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let t = setup().await;
        let body = json!({ "username": "new.user", "password": "long-enough" });

        let (status, json) = send(&t.app, "POST", "/auth/register", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["role"], "user");
        assert!(json.get("passwordHash").is_none());

        let (status, json) = send(&t.app, "POST", "/auth/login", None, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tokenType"], "Bearer");
        let token = json["accessToken"].as_str().unwrap().to_string();

        let (status, json) = send(&t.app, "GET", "/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["username"], "new.user");
    }

    #[tokio::test]
    async fn test_bad_login_is_unauthorized() {
        let t = setup().await;
        let body = json!({ "username": "jane", "password": "wrong-password" });
        let (status, json) = send(&t.app, "POST", "/auth/login", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["statusCode"], 401);
    }
}

mod authorization {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let t = setup().await;
        let (status, json) = send(&t.app, "GET", "/orders", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["statusCode"], 401);
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let t = setup().await;
        let (status, _) = send(&t.app, "GET", "/orders", Some("not.a.jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_cannot_list_all_orders() {
        let t = setup().await;
        let (status, json) = send(&t.app, "GET", "/orders", Some(&t.user_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["statusCode"], 403);
        assert!(json.get("orders").is_none());
    }

    #[tokio::test]
    async fn test_user_cannot_write_order_items() {
        let t = setup().await;
        let body = json!({ "orderId": 1, "productId": 1, "quantity": 1, "price": 1 });
        let (status, _) = send(
            &t.app,
            "POST",
            "/order-items",
            Some(&t.user_token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_user_cannot_read_reports() {
        let t = setup().await;
        for uri in [
            "/reports/audit-log",
            "/reports/stock-levels",
            "/reports/order-history",
            "/reports/dashboard",
        ] {
            let (status, _) = send(&t.app, "GET", uri, Some(&t.user_token), None).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_role_check_precedes_body_validation() {
        let t = setup().await;
        let body = json!({ "totalAmount": "abc" });
        let (status, _) = send(
            &t.app,
            "PUT",
            "/orders/1",
            Some(&t.user_token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_credential_check_precedes_body_validation() {
        let t = setup().await;
        let body = json!({ "bogus": 1 });
        let (status, json) = send(&t.app, "POST", "/orders", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["statusCode"], 401);
    }

    #[tokio::test]
    async fn test_role_check_precedes_query_and_path_parsing() {
        let t = setup().await;
        let (status, _) = send(
            &t.app,
            "GET",
            "/orders?page=abc",
            Some(&t.user_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&t.app, "DELETE", "/orders/abc", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authorized_caller_still_gets_input_errors() {
        let t = setup().await;
        let body = json!({ "totalAmount": "abc" });
        let (status, json) = send(
            &t.app,
            "PUT",
            "/orders/1",
            Some(&t.admin_token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["statusCode"], 400);
    }
}

mod orders {
    use super::*;

    #[tokio::test]
    async fn test_empty_order_list() {
        let t = setup().await;
        let (status, json) = send(
            &t.app,
            "GET",
            "/orders?page=1&limit=10",
            Some(&t.admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "orders": [], "total": 0, "totalPages": 0 }));
    }

    #[tokio::test]
    async fn test_create_order_scenario() {
        let t = setup().await;
        let (status, order) = send(
            &t.app,
            "POST",
            "/orders",
            Some(&t.user_token),
            Some(john_doe()),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["customerName"], "John Doe");
        assert_eq!(order["items"].as_array().unwrap().len(), 1);
        assert_eq!(order["items"][0]["quantity"], 2);
        assert_eq!(order["items"][0]["price"], 50.0);
        assert_eq!(order["totalAmount"], 100.0);

        let (status, logs) = send(
            &t.app,
            "GET",
            "/reports/audit-log?entityName=Order&action=CREATE",
            Some(&t.admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs["total"], 1);
        assert_eq!(logs["data"][0]["entityId"], order["id"]);
        assert_eq!(logs["data"][0]["performedBy"], "jane");
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let t = setup().await;
        let mut body = john_doe();
        body["items"][0]["productId"] = json!(99);

        let (status, json) = send(
            &t.app,
            "POST",
            "/orders",
            Some(&t.admin_token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Product with id 99 not found");

        let (_, list) = send(&t.app, "GET", "/orders", Some(&t.admin_token), None).await;
        assert_eq!(list["total"], 0);
    }

    #[tokio::test]
    async fn test_validation_errors_are_listed() {
        let t = setup().await;
        let body = json!({
            "customerName": "",
            "shippingAddress": "123 Main St",
            "totalAmount": -1,
            "items": []
        });
        let (status, json) = send(
            &t.app,
            "POST",
            "/orders",
            Some(&t.admin_token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["statusCode"], 400);
        assert_eq!(json["details"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let t = setup().await;
        let request = Request::builder()
            .method("POST")
            .uri("/orders")
            .header(header::AUTHORIZATION, format!("Bearer {}", t.admin_token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ not json"))
            .unwrap();
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_replaces_items() {
        let t = setup().await;
        let (_, order) = send(
            &t.app,
            "POST",
            "/orders",
            Some(&t.admin_token),
            Some(john_doe()),
        )
        .await;
        let uri = format!("/orders/{}", order["id"]);

        let patch = json!({ "items": [{ "productId": 1, "quantity": 5, "price": 10 }] });
        let (status, updated) = send(&t.app, "PUT", &uri, Some(&t.admin_token), Some(patch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["items"].as_array().unwrap().len(), 1);
        assert_eq!(updated["items"][0]["quantity"], 5);
        assert_eq!(updated["totalAmount"], 50.0);
        assert_eq!(updated["customerName"], "John Doe");
    }

    #[tokio::test]
    async fn test_remove_hides_order() {
        let t = setup().await;
        let (_, order) = send(
            &t.app,
            "POST",
            "/orders",
            Some(&t.user_token),
            Some(john_doe()),
        )
        .await;
        let uri = format!("/orders/{}", order["id"]);

        let (status, body) = send(&t.app, "DELETE", &uri, Some(&t.admin_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = send(&t.app, "GET", &uri, Some(&t.admin_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let with_deleted = format!("{uri}?includeDeleted=true");
        let (status, json) = send(&t.app, "GET", &with_deleted, Some(&t.admin_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!json["deletedAt"].is_null());

        let (status, _) = send(&t.app, "GET", &with_deleted, Some(&t.user_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&t.app, "DELETE", &uri, Some(&t.admin_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_own_orders() {
        let t = setup().await;
        send(&t.app, "POST", "/orders", Some(&t.user_token), Some(john_doe())).await;
        send(&t.app, "POST", "/orders", Some(&t.admin_token), Some(john_doe())).await;

        let (status, json) = send(
            &t.app,
            "GET",
            "/orders/user/all",
            Some(&t.user_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_added_line_refreshes_order_total() {
        let t = setup().await;
        let (_, order) = send(
            &t.app,
            "POST",
            "/orders",
            Some(&t.admin_token),
            Some(john_doe()),
        )
        .await;
        assert_eq!(order["totalAmount"], 100.0);

        let line = json!({
            "orderId": order["id"],
            "productId": 1,
            "quantity": 3,
            "price": 50.00
        });
        let (status, _) = send(
            &t.app,
            "POST",
            "/order-items",
            Some(&t.admin_token),
            Some(line),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/orders/{}", order["id"]);
        let (status, order) = send(&t.app, "GET", &uri, Some(&t.admin_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["totalAmount"], 250.0);
        assert_eq!(order["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_total_beyond_the_cent_range_is_bad_request() {
        let t = setup().await;
        let mut body = john_doe();
        body["items"] = json!([
            { "productId": 1, "quantity": 1, "price": 50_000_000_000_000_000_u64 },
            { "productId": 1, "quantity": 1, "price": 50_000_000_000_000_000_u64 }
        ]);

        let (status, json) = send(
            &t.app,
            "POST",
            "/orders",
            Some(&t.admin_token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["statusCode"], 400);
    }

    #[tokio::test]
    async fn test_bad_path_id_is_bad_request() {
        let t = setup().await;
        let (status, json) = send(&t.app, "GET", "/orders/abc", Some(&t.admin_token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["statusCode"], 400);
    }
}

mod reports {
    use super::*;

    #[tokio::test]
    async fn test_order_report_requires_both_dates() {
        let t = setup().await;
        let (status, json) = send(
            &t.app,
            "GET",
            "/reports/order-history/report?startDate=2024-01-01",
            Some(&t.admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["details"][0], "endDate is required");
    }

    #[tokio::test]
    async fn test_dashboard() {
        let t = setup().await;
        send(&t.app, "POST", "/orders", Some(&t.user_token), Some(john_doe())).await;

        let (status, json) = send(
            &t.app,
            "GET",
            "/reports/dashboard",
            Some(&t.admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["totalProducts"], 1);
        assert_eq!(json["totalOrders"], 1);
        assert_eq!(json["totalRevenue"], 100.0);
        assert_eq!(json["recentOrders"].as_array().unwrap().len(), 1);
    }
}

mod rate_limiting {
    use super::*;

    #[tokio::test]
    async fn test_over_budget_requests_get_429() {
        let state = Arc::new(AppState::new(InMemoryStore::new(), &Config::default()));
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(SlidingWindowLimiter::new(2, Duration::from_secs(600)));
        let app = create_app(state, get_metrics_handle(), limiter);

        let request = || {
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", "198.51.100.4")
                .body(Body::empty())
                .unwrap()
        };
        for _ in 0..2 {
            let response = app.clone().oneshot(request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let other_client = Request::builder()
            .uri("/health")
            .header("x-forwarded-for", "198.51.100.5")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(other_client).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
