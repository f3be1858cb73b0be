use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::{Document, Filter, Result, Update, Validator};

/// Acknowledgment strength required before a commit is reported durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteConcern {
    /// The primary acknowledged the write.
    #[default]
    Acknowledged,
    /// The strongest durability the backend offers (a majority of replicas
    /// where replication exists).
    Majority,
}

/// Isolation level of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Reads see a consistent snapshot taken when the transaction starts;
    /// concurrent writes to the same document conflict.
    #[default]
    Snapshot,
}

/// Options for starting a transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    pub write_concern: WriteConcern,
    pub isolation: Isolation,
}

impl TransactionOptions {
    /// Creates options with the backend defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates snapshot-isolated options with majority write concern.
    pub fn majority() -> Self {
        Self {
            write_concern: WriteConcern::Majority,
            isolation: Isolation::Snapshot,
        }
    }
}

/// Options for creating a collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    /// Rules every inserted or updated document must satisfy.
    pub validator: Validator,
}

impl CollectionOptions {
    /// Creates options with no validator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options attaching the given validator.
    pub fn with_validator(validator: Validator) -> Self {
        Self { validator }
    }
}

/// Outcome of an `update_one` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    /// Number of documents the filter matched (0 or 1).
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
}

/// Core trait for document store clients.
///
/// Every data operation optionally takes a session. Without one the
/// operation is an independent write, visible to other readers as soon as it
/// returns. With one, writes are staged and become visible atomically when
/// the session commits.
///
/// Dropping a session that was neither committed nor aborted must discard its
/// staged writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Handle for an open transaction.
    type Session: Send;

    /// Creates a collection, or replaces the validator of an existing one.
    async fn create_collection(&self, name: &str, options: CollectionOptions) -> Result<()>;

    /// Inserts a document. Fails with `DuplicateKey` if its `_id` is taken.
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&mut Self::Session>,
    ) -> Result<()>;

    /// Applies `update` to the first document matching `filter`.
    ///
    /// Matching nothing is not an error: `UpdateResult::matched` is zero.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        session: Option<&mut Self::Session>,
    ) -> Result<UpdateResult>;

    /// Returns every document matching `filter`, ordered by `_id`.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&mut Self::Session>,
    ) -> Result<Vec<Document>>;

    /// Deletes every document matching `filter`, returning the count.
    async fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&mut Self::Session>,
    ) -> Result<u64>;

    /// Opens a transaction.
    async fn start_transaction(&self, options: TransactionOptions) -> Result<Self::Session>;

    /// Makes every staged write of the session visible atomically.
    async fn commit_transaction(&self, session: Self::Session) -> Result<()>;

    /// Discards every staged write of the session.
    async fn abort_transaction(&self, session: Self::Session) -> Result<()>;
}

/// Extension trait providing convenience methods for document stores.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&mut Self::Session>,
    ) -> Result<Option<Document>> {
        Ok(self
            .find(collection, filter, session)
            .await?
            .into_iter()
            .next())
    }

    /// Returns every document matching `filter`, deserialized.
    async fn find_as<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&mut Self::Session>,
    ) -> Result<Vec<T>> {
        self.find(collection, filter, session)
            .await?
            .into_iter()
            .map(|document| serde_json::from_value(document).map_err(Into::into))
            .collect()
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}
