pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    AuditAction, AuditEntry, AuditLog, Category, DashboardCounts, NewOrder, NewOrderItem,
    NewProduct, NewUser, Order, OrderChanges, OrderItem, OrderItemChanges, OrderLine,
    OrderSummary, Product, ProductChanges, StockPolicy, TotalPolicy, User, UserChanges,
};
pub use postgres::PostgresStore;
pub use query::{AuditLogQuery, OrderHistoryQuery, OrderQuery, ProductQuery};
pub use store::{AuditStore, CatalogStore, OrderStore, ReportStore, Store, UserStore};
