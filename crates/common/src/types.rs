use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database id.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw database id.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered user.
    UserId
);
entity_id!(
    /// Identifier of a catalog product.
    ProductId
);
entity_id!(
    /// Identifier of a product category.
    CategoryId
);
entity_id!(
    /// Identifier of an order (the aggregate root).
    OrderId
);
entity_id!(
    /// Identifier of a single order line.
    OrderItemId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_preserves_raw_value() {
        let id = OrderId::new(42);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(ProductId::from(7).to_string(), "7");
    }

    #[test]
    fn id_serializes_as_bare_integer() {
        let json = serde_json::to_string(&ProductId::new(3)).unwrap();
        assert_eq!(json, "3");

        let id: UserId = serde_json::from_str("11").unwrap();
        assert_eq!(id, UserId::new(11));
    }

    #[test]
    fn ids_order_by_raw_value() {
        assert!(OrderItemId::new(1) < OrderItemId::new(2));
    }
}
