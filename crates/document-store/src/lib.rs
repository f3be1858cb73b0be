//! Document store client abstraction.
//!
//! Exposes collections of JSON documents keyed by `_id`, filter and update
//! expressions, per-collection validators and snapshot-isolated sessions.
//! Two backends implement [`DocumentStore`]: an in-memory multi-version store
//! and a PostgreSQL store.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;
pub mod validator;

pub use document::{Document, ID_FIELD};
pub use error::{Result, StoreError};
pub use memory::{FailPoint, InMemoryDocumentStore, InMemorySession};
pub use postgres::{PostgresDocumentStore, PostgresSession};
pub use query::{Filter, Update};
pub use store::{
    CollectionOptions, DocumentStore, DocumentStoreExt, Isolation, TransactionOptions,
    UpdateResult, WriteConcern,
};
pub use validator::{FieldRule, RuleViolation, Validator};
