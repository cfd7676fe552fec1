//! Audit trail: standalone appends and the filtered, paginated log view.

use serde_json::Value;
use store::{AuditAction, AuditEntry, AuditLog, AuditLogQuery, AuditStore};

use crate::error::Result;
use crate::page::Page;

/// Entity names recorded in the audit trail.
pub mod entity {
    pub const ORDER: &str = "Order";
    pub const ORDER_ITEM: &str = "OrderItem";
    pub const PRODUCT: &str = "Product";
    pub const CATEGORY: &str = "Category";
    pub const USER: &str = "User";
}

/// Builds an audit entry.
///
/// Aggregate services hand the entry to the store, which writes it in the
/// same transaction as the change it describes.
pub(crate) fn entry(
    entity_name: &'static str,
    action: AuditAction,
    changes: Value,
    performed_by: Option<&str>,
) -> AuditEntry {
    AuditEntry::new(entity_name, action, changes).performed_by(performed_by)
}

/// Counts a committed audit record.
pub(crate) fn recorded(entity_name: &'static str) {
    metrics::counter!("audit_records_total", "entity" => entity_name).increment(1);
}

/// Service over the audit trail.
pub struct AuditService<S: AuditStore> {
    store: S,
}

impl<S: AuditStore> AuditService<S> {
    /// Creates a new audit service.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Appends a standalone record.
    #[tracing::instrument(skip(self, changes))]
    pub async fn log_action(
        &self,
        entity_name: &'static str,
        entity_id: i64,
        action: AuditAction,
        changes: Value,
        performed_by: Option<&str>,
    ) -> Result<AuditLog> {
        let entry = entry(entity_name, action, changes, performed_by);
        let log = self.store.append_audit(entity_id, entry).await?;
        recorded(entity_name);
        Ok(log)
    }

    /// Returns one page of matching records, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_audit_logs(&self, query: &AuditLogQuery) -> Result<Page<AuditLog>> {
        let (data, total) = self.store.query_audit_logs(query).await?;
        Ok(Page::new(data, total, query.page))
    }
}

#[cfg(test)]
mod tests {
    use common::PageRequest;
    use store::InMemoryStore;

    use super::*;

    #[tokio::test]
    async fn empty_log_has_zero_last_page() {
        let service = AuditService::new(InMemoryStore::new());
        let page = service
            .get_audit_logs(&AuditLogQuery::new(PageRequest::new(Some(1), Some(10))))
            .await
            .unwrap();

        assert!(page.data.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.last_page, 0);
    }

    #[tokio::test]
    async fn filters_are_and_combined_newest_first() {
        let service = AuditService::new(InMemoryStore::new());
        let writes = [
            (entity::ORDER, AuditAction::Create),
            (entity::ORDER, AuditAction::Update),
            (entity::PRODUCT, AuditAction::Update),
            (entity::ORDER, AuditAction::Update),
        ];
        for (i, (name, action)) in writes.into_iter().enumerate() {
            service
                .log_action(name, i as i64, action, Value::Null, Some("admin"))
                .await
                .unwrap();
        }

        let query = AuditLogQuery::new(PageRequest::default())
            .entity_name("Order")
            .action("UPDATE");
        let page = service.get_audit_logs(&query).await.unwrap();

        assert_eq!(page.total, 2);
        assert!(
            page.data
                .iter()
                .all(|log| log.entity_name == "Order" && log.action == "UPDATE")
        );
        assert_eq!(page.data[0].entity_id, 3);
        assert_eq!(page.data[1].entity_id, 1);
    }

    #[tokio::test]
    async fn substring_filter_ignores_case() {
        let service = AuditService::new(InMemoryStore::new());
        service
            .log_action(entity::ORDER_ITEM, 1, AuditAction::Delete, Value::Null, None)
            .await
            .unwrap();

        let query = AuditLogQuery::new(PageRequest::default()).entity_name("item");
        let page = service.get_audit_logs(&query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.last_page, 1);
    }
}
