//! Domain error types.

use auth::AuthError;
use store::StoreError;
use thiserror::Error;

use crate::validation::ValidationErrors;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The input was malformed. Raised before any business logic runs.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The write conflicts with existing state.
    #[error("{0}")]
    Conflict(String),

    /// Missing, invalid or expired credential.
    #[error("{0}")]
    Unauthorized(String),

    /// Valid credential, insufficient role.
    #[error("{0}")]
    Forbidden(String),

    /// Unexpected failure. The message is safe to show to clients.
    #[error("{0}")]
    Internal(String),
}

impl DomainError {
    /// Builds a `NotFound` naming the entity and id.
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound(format!("{entity} with id {id} not found"))
    }

    fn internal(source: &dyn std::error::Error) -> Self {
        tracing::error!(error = %source, "Internal failure");
        DomainError::Internal("Internal server error".to_string())
    }
}

impl From<ValidationErrors> for DomainError {
    fn from(errors: ValidationErrors) -> Self {
        DomainError::Validation(errors)
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => DomainError::NotFound(e.to_string()),
            StoreError::Conflict(message) => DomainError::Conflict(message),
            other => DomainError::internal(&other),
        }
    }
}

impl From<AuthError> for DomainError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Store(inner) => inner.into(),
            AuthError::Forbidden { .. } => DomainError::Forbidden(e.to_string()),
            e if e.is_unauthorized() => DomainError::Unauthorized(e.to_string()),
            other => DomainError::internal(&other),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::internal(&e)
    }
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_keeps_entity_and_id() {
        let err: DomainError = StoreError::not_found("Product", 42).into();
        assert!(matches!(err, DomainError::NotFound(ref m) if m == "Product with id 42 not found"));
    }

    #[test]
    fn unexpected_store_errors_are_hidden() {
        let err: DomainError = StoreError::Corrupt("quantity -1".to_string()).into();
        assert!(matches!(err, DomainError::Internal(ref m) if m == "Internal server error"));
    }

    #[test]
    fn auth_errors_map_to_status_classes() {
        let err: DomainError = AuthError::MissingCredential.into();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        let err: DomainError = AuthError::Forbidden {
            operation: auth::Operation::ListOrders,
            role: common::Role::User,
        }
        .into();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }
}
