//! HTTP API server with observability for the inventory management system.
//!
//! Provides REST endpoints for orders, order items, the catalog, user
//! accounts and reports, with bearer-token authorization, per-client rate
//! limiting, structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod rate_limit;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use auth::{Authorizer, Identity, Operation, TokenService};
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use domain::{AuditService, CatalogService, OrderItemService, OrderService, UserService};
use metrics_exporter_prometheus::PrometheusHandle;
use reports::ReportService;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::ApiError;
use extract::Bearer;
use rate_limit::{RateLimiter, SlidingWindowLimiter};

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub authorizer: Authorizer<S>,
    pub users: UserService<S>,
    pub catalog: CatalogService<S>,
    pub orders: OrderService<S>,
    pub order_items: OrderItemService<S>,
    pub audit: AuditService<S>,
    pub reports: ReportService<S>,
}

impl<S: Store> AppState<S> {
    /// Wires every service to the same store.
    pub fn new(store: S, config: &Config) -> Self {
        let tokens = TokenService::new(config.jwt_secret().as_bytes(), config.jwt_ttl_secs);
        Self {
            authorizer: Authorizer::new(store.clone(), tokens.clone()),
            users: UserService::new(store.clone(), tokens),
            catalog: CatalogService::new(store.clone()),
            orders: OrderService::with_policy(store.clone(), config.order_policy),
            order_items: OrderItemService::with_policy(store.clone(), config.order_policy),
            audit: AuditService::new(store.clone()),
            reports: ReportService::with_low_stock_threshold(store, config.low_stock_threshold),
        }
    }

    /// Runs the capability check for `operation`. Public operations yield
    /// `None`.
    pub async fn authorize(
        &self,
        operation: Operation,
        bearer: &Bearer,
    ) -> Result<Option<Identity>, ApiError> {
        Ok(self.authorizer.authorize(operation, bearer.token()).await?)
    }

    /// Runs the capability check and returns the caller.
    pub async fn require(
        &self,
        operation: Operation,
        bearer: &Bearer,
    ) -> Result<Identity, ApiError> {
        Ok(self.authorizer.require(operation, bearer.token()).await?)
    }
}

/// Builds the default rate limiter from configuration.
pub fn create_rate_limiter(config: &Config) -> Arc<dyn RateLimiter> {
    Arc::new(SlidingWindowLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    ))
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
    limiter: Arc<dyn RateLimiter>,
) -> Router {
    use routes::{auth, categories, health, order_items, orders, products, reports, users};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check))
        .route("/auth/register", post(auth::register::<S>))
        .route("/auth/login", post(auth::login::<S>))
        .route("/users/me", get(users::profile::<S>))
        .route("/users/me/password", put(users::change_password::<S>))
        .route("/users/me/username", put(users::change_username::<S>))
        .route(
            "/categories",
            get(categories::list::<S>).post(categories::create::<S>),
        )
        .route(
            "/categories/{id}",
            get(categories::get::<S>)
                .put(categories::update::<S>)
                .delete(categories::delete::<S>),
        )
        .route(
            "/products",
            get(products::list::<S>).post(products::create::<S>),
        )
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .put(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route(
            "/products/{id}/categories",
            put(products::update_categories::<S>),
        )
        .route("/orders", get(orders::list::<S>).post(orders::create::<S>))
        .route("/orders/user/all", get(orders::list_own::<S>))
        .route(
            "/orders/{id}",
            get(orders::get::<S>)
                .put(orders::update::<S>)
                .delete(orders::remove::<S>),
        )
        .route(
            "/order-items",
            get(order_items::list::<S>).post(order_items::create::<S>),
        )
        .route(
            "/order-items/{id}",
            get(order_items::get::<S>)
                .put(order_items::update::<S>)
                .delete(order_items::remove::<S>),
        )
        .route("/reports/audit-log", get(reports::audit_log::<S>))
        .route("/reports/stock-levels", get(reports::stock_levels::<S>))
        .route("/reports/order-history", get(reports::order_history::<S>))
        .route(
            "/reports/order-history/report",
            get(reports::order_report::<S>),
        )
        .route("/reports/dashboard", get(reports::dashboard::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(middleware::from_fn_with_state(limiter, rate_limit::enforce))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
