use chrono::{DateTime, Utc};
use common::{Money, PageRequest};

/// Filters for the paginated order listing.
///
/// Soft-deleted orders are excluded unless `include_deleted` is set.
/// Each date bound applies on its own (inclusive).
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub page: PageRequest,
    pub customer_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub include_deleted: bool,
}

impl OrderQuery {
    /// Creates a query for the given page.
    pub fn new(page: PageRequest) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    /// Filters by exact customer name.
    pub fn customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    /// Keeps orders created at or after this instant.
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Keeps orders created at or before this instant.
    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Includes soft-deleted orders.
    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }
}

/// Filters for the audit log. Every filter is a case-insensitive substring
/// match and all given filters must hold.
#[derive(Debug, Clone, Default)]
pub struct AuditLogQuery {
    pub page: PageRequest,
    pub entity_name: Option<String>,
    pub action: Option<String>,
    pub performed_by: Option<String>,
}

impl AuditLogQuery {
    /// Creates a query for the given page.
    pub fn new(page: PageRequest) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    /// Filters by entity name substring.
    pub fn entity_name(mut self, value: impl Into<String>) -> Self {
        self.entity_name = Some(value.into());
        self
    }

    /// Filters by action substring.
    pub fn action(mut self, value: impl Into<String>) -> Self {
        self.action = Some(value.into());
        self
    }

    /// Filters by actor substring.
    pub fn performed_by(mut self, value: impl Into<String>) -> Self {
        self.performed_by = Some(value.into());
        self
    }
}

/// Filters for the order history report. Every filter is optional and
/// applies independently.
#[derive(Debug, Clone, Default)]
pub struct OrderHistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub customer_name: Option<String>,
    pub min_total: Option<Money>,
    pub max_total: Option<Money>,
    pub include_deleted: bool,
}

/// Filters for the product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub page: PageRequest,
    /// Case-insensitive substring of the product name.
    pub search: Option<String>,
}

/// Lowercased `LIKE` pattern for a substring match, with wildcards in the
/// needle escaped.
pub(crate) fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// In-memory counterpart of `ILIKE '%needle%'`.
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_query_builder_chain() {
        let now = Utc::now();
        let query = OrderQuery::new(PageRequest::new(Some(2), Some(5)))
            .customer_name("John Doe")
            .from(now)
            .include_deleted(true);

        assert_eq!(query.page.page, 2);
        assert_eq!(query.customer_name.as_deref(), Some("John Doe"));
        assert_eq!(query.from, Some(now));
        assert!(query.to.is_none());
        assert!(query.include_deleted);
    }

    #[test]
    fn audit_query_builder_chain() {
        let query = AuditLogQuery::new(PageRequest::default())
            .entity_name("order")
            .action("UPD");

        assert_eq!(query.entity_name.as_deref(), Some("order"));
        assert_eq!(query.action.as_deref(), Some("UPD"));
        assert!(query.performed_by.is_none());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn substring_match_ignores_case() {
        assert!(contains_ignore_case("OrderItem", "order"));
        assert!(!contains_ignore_case("Product", "order"));
    }
}
