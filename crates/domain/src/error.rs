//! Domain error types.

use document_store::StoreError;
use thiserror::Error;

use crate::guard::InventoryGuard;

/// Errors surfaced by the store facade.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A write would break a declared data invariant.
    #[error("Constraint violation on {field}: {reason}")]
    ConstraintViolation { field: String, reason: String },

    /// The filter matched no record.
    #[error("No {collection} record matches {filter}")]
    NotFound {
        collection: &'static str,
        filter: String,
    },

    /// A concurrent transaction wrote the same record first.
    #[error("Write conflict on {collection}/{id}")]
    WriteConflict { collection: String, id: String },

    /// The store failed the operation, or a transaction scope could not be
    /// used, committed or aborted.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The store could not be reached.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true if aborting and retrying the transaction may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::WriteConflict { .. })
    }
}

impl From<StoreError> for DomainError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ValidationFailed {
                collection,
                field,
                rule,
            } => InventoryGuard::translate(&collection, field, rule),
            StoreError::DuplicateKey { id, .. } => DomainError::ConstraintViolation {
                field: document_store::ID_FIELD.to_string(),
                reason: format!("duplicate key '{id}'"),
            },
            StoreError::MissingId { .. } => DomainError::ConstraintViolation {
                field: document_store::ID_FIELD.to_string(),
                reason: "missing".to_string(),
            },
            StoreError::WriteConflict { collection, id } => {
                DomainError::WriteConflict { collection, id }
            }
            StoreError::Commit(reason) => DomainError::Transaction(reason),
            StoreError::Connectivity(reason) => DomainError::Connectivity(reason),
            StoreError::Serialization(e) => DomainError::Serialization(e),
            error @ (StoreError::InvalidUpdate { .. }
            | StoreError::Database(_)
            | StoreError::Migration(_)) => DomainError::Transaction(error.to_string()),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_store_errors() {
        let err: DomainError = StoreError::WriteConflict {
            collection: "product".to_string(),
            id: "chocolate".to_string(),
        }
        .into();
        assert!(err.is_transient());

        let err: DomainError = StoreError::Connectivity("reset".to_string()).into();
        assert!(matches!(err, DomainError::Connectivity(_)));

        let err: DomainError = StoreError::Commit("no ack".to_string()).into();
        assert!(matches!(err, DomainError::Transaction(_)));

        let err: DomainError = StoreError::DuplicateKey {
            collection: "cart".to_string(),
            id: "Nofar".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            DomainError::ConstraintViolation { ref field, .. } if field == "_id"
        ));

        let err: DomainError = StoreError::InvalidUpdate {
            collection: "cart".to_string(),
            reason: "items is not an array".to_string(),
        }
        .into();
        assert!(matches!(err, DomainError::Transaction(ref reason) if reason.contains("items")));
    }
}
