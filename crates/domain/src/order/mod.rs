//! Order aggregate: the order root and the lines it owns.

mod input;
mod policy;
mod service;

pub use input::{CreateOrder, UpdateOrder};
pub use policy::OrderPolicy;
pub use service::OrderService;
