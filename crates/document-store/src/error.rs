use thiserror::Error;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document with the same `_id` already exists in the collection.
    #[error("Duplicate key in {collection}: {id}")]
    DuplicateKey { collection: String, id: String },

    /// The document has no string `_id` field.
    #[error("Document in {collection} has no string _id")]
    MissingId { collection: String },

    /// The write was rejected by the collection's validator.
    #[error("Document failed validation in {collection}: {field} {rule}")]
    ValidationFailed {
        collection: String,
        field: String,
        rule: String,
    },

    /// The update expression cannot be applied to the matched document.
    #[error("Invalid update on {collection}: {reason}")]
    InvalidUpdate { collection: String, reason: String },

    /// Another session wrote the same document. Transient: abort and retry.
    #[error("Write conflict on {collection}/{id}")]
    WriteConflict { collection: String, id: String },

    /// The commit was not acknowledged by the store.
    #[error("Commit failed: {0}")]
    Commit(String),

    /// The store could not be reached.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if retrying the whole transaction may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::WriteConflict { .. })
    }
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
