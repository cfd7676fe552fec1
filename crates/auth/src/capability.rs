//! Operation to role capability table.

use common::Role;

/// Every operation exposed at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Health,
    Metrics,
    Register,
    Login,
    Profile,
    ChangePassword,
    ChangeUsername,

    ListCategories,
    GetCategory,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,

    ListProducts,
    GetProduct,
    CreateProduct,
    UpdateProduct,
    UpdateProductCategories,
    DeleteProduct,

    ListOrders,
    GetOrder,
    ListOwnOrders,
    CreateOrder,
    UpdateOrder,
    RemoveOrder,

    ListOrderItems,
    GetOrderItem,
    CreateOrderItem,
    UpdateOrderItem,
    RemoveOrderItem,

    AuditLog,
    StockLevels,
    OrderHistory,
    OrderReport,
    Dashboard,
}

/// Who may invoke an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No credential required.
    Public,
    /// Any authenticated caller.
    Authenticated,
    /// Authenticated callers holding one of these roles.
    Roles(&'static [Role]),
}

impl Access {
    /// Returns true when `role` satisfies this requirement.
    pub fn permits(&self, role: Role) -> bool {
        match self {
            Access::Public | Access::Authenticated => true,
            Access::Roles(roles) => roles.contains(&role),
        }
    }
}

const ADMIN: &[Role] = &[Role::Admin];
const ADMIN_OR_USER: &[Role] = &[Role::Admin, Role::User];
const USER: &[Role] = &[Role::User];

/// The capability table.
pub const fn access(operation: Operation) -> Access {
    use Operation::*;

    match operation {
        Health | Metrics | Register | Login => Access::Public,

        Profile | ChangePassword | ChangeUsername => Access::Authenticated,
        ListCategories | GetCategory | ListProducts | GetProduct => Access::Authenticated,

        CreateCategory | UpdateCategory | DeleteCategory => Access::Roles(ADMIN),
        CreateProduct | UpdateProduct | UpdateProductCategories | DeleteProduct => {
            Access::Roles(ADMIN)
        }

        GetOrder | CreateOrder => Access::Roles(ADMIN_OR_USER),
        ListOwnOrders => Access::Roles(USER),
        ListOrders | UpdateOrder | RemoveOrder => Access::Roles(ADMIN),

        ListOrderItems | GetOrderItem => Access::Roles(ADMIN_OR_USER),
        CreateOrderItem | UpdateOrderItem | RemoveOrderItem => Access::Roles(ADMIN),

        AuditLog | StockLevels | OrderHistory | OrderReport | Dashboard => Access::Roles(ADMIN),
    }
}
