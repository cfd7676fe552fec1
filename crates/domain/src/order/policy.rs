use common::Money;
use store::{OrderLine, StockPolicy, TotalPolicy};

/// Tunables for order writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPolicy {
    /// Store `Σ quantity × price` instead of the client's total.
    pub recompute_total: bool,
    /// Take product stock on placement and return it on replace or removal.
    pub adjust_stock: bool,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            recompute_total: true,
            adjust_stock: false,
        }
    }
}

impl OrderPolicy {
    pub fn stock(&self) -> StockPolicy {
        if self.adjust_stock {
            StockPolicy::Adjust
        } else {
            StockPolicy::Untracked
        }
    }

    /// How single-line writes treat the owning order's total.
    pub fn totals(&self) -> TotalPolicy {
        if self.recompute_total {
            TotalPolicy::Recompute
        } else {
            TotalPolicy::Keep
        }
    }

    /// The total to store for an order with these lines.
    pub fn total(&self, claimed: Money, lines: &[OrderLine]) -> Money {
        if self.recompute_total {
            lines.iter().map(OrderLine::line_total).sum()
        } else {
            claimed
        }
    }
}
