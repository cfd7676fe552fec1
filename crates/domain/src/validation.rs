//! Field-level input validation.

use common::Money;
use serde::Serialize;

/// Field messages collected while validating one input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for `field`.
    pub fn add(&mut self, field: &str, message: impl std::fmt::Display) {
        self.0.push(format!("{field} {message}"));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Returns `Err(self)` when any message was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Requires a non-blank string of at most `max` characters.
    pub fn text(&mut self, field: &str, value: &str, max: usize) {
        if value.trim().is_empty() {
            self.add(field, "should not be empty");
        } else if value.chars().count() > max {
            self.add(field, format_args!("must be at most {max} characters"));
        }
    }

    /// Requires a monetary amount of zero or more.
    pub fn non_negative(&mut self, field: &str, value: Money) {
        if value.is_negative() {
            self.add(field, "must not be negative");
        }
    }

    /// Requires a stock count of zero or more.
    pub fn non_negative_count(&mut self, field: &str, value: i64) {
        if value < 0 {
            self.add(field, "must not be negative");
        }
    }

    /// Requires a positive quantity.
    pub fn positive(&mut self, field: &str, value: u32) {
        if value == 0 {
            self.add(field, "must be a positive integer");
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}
