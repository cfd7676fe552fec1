//! Order inputs as received from the boundary.

use common::Money;
use serde::{Deserialize, Serialize};
use store::OrderLine;

use crate::validation::ValidationErrors;

const CUSTOMER_NAME_MAX: usize = 255;
const SHIPPING_ADDRESS_MAX: usize = 1_000;

/// Input for placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub customer_name: String,
    pub shipping_address: String,
    pub total_amount: Money,
    #[serde(default)]
    pub items: Vec<OrderLine>,
}

impl CreateOrder {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.text("customerName", &self.customer_name, CUSTOMER_NAME_MAX);
        errors.text("shippingAddress", &self.shipping_address, SHIPPING_ADDRESS_MAX);
        errors.non_negative("totalAmount", self.total_amount);
        validate_lines(&mut errors, &self.items);
        errors.into_result()
    }
}

/// Partial update of an order.
///
/// A field is applied iff it is present. `items`, when present, replaces
/// every existing line, so `items: []` clears the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderLine>>,
}

impl UpdateOrder {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(ref name) = self.customer_name {
            errors.text("customerName", name, CUSTOMER_NAME_MAX);
        }
        if let Some(ref address) = self.shipping_address {
            errors.text("shippingAddress", address, SHIPPING_ADDRESS_MAX);
        }
        if let Some(total) = self.total_amount {
            errors.non_negative("totalAmount", total);
        }
        if let Some(ref items) = self.items {
            validate_lines(&mut errors, items);
        }
        errors.into_result()
    }
}

fn validate_lines(errors: &mut ValidationErrors, lines: &[OrderLine]) {
    for (i, line) in lines.iter().enumerate() {
        errors.positive(&format!("items[{i}].quantity"), line.quantity);
        errors.non_negative(&format!("items[{i}].price"), line.price);
    }

    let total = lines.iter().try_fold(Money::zero(), |acc, line| {
        line.price
            .checked_multiply(line.quantity)
            .and_then(|line_total| acc.checked_add(line_total))
    });
    if total.is_none() {
        errors.add("items", "total is out of range");
    }
}
