//! Typed store facade and transaction scopes.

use document_store::{
    CollectionOptions, DocumentStore, DocumentStoreExt, Filter, TransactionOptions, Update,
    UpdateResult,
};

use crate::error::{DomainError, Result};
use crate::guard::InventoryGuard;
use crate::record::{Cart, Product, Record};

/// The lifecycle of a transaction scope.
///
/// State transitions:
/// ```text
/// Open ──┬──► Committed
///        └──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeState {
    /// Writes are being staged.
    Open,
    /// All staged writes became visible together (terminal state).
    Committed,
    /// No staged write is visible (terminal state).
    Aborted,
}

impl ScopeState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScopeState::Committed | ScopeState::Aborted)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeState::Open => "Open",
            ScopeState::Committed => "Committed",
            ScopeState::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for ScopeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An atomic, isolated unit of work.
///
/// Holds the store session until the scope is committed or rolled back; the
/// session is released exactly once. Dropping an open scope aborts it.
pub struct TransactionScope<S: DocumentStore> {
    session: Option<S::Session>,
    state: ScopeState,
    options: TransactionOptions,
}

impl<S: DocumentStore> TransactionScope<S> {
    /// Returns the current lifecycle state.
    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// Returns the options the scope was opened with.
    pub fn options(&self) -> TransactionOptions {
        self.options
    }

    fn session_mut(&mut self) -> Result<&mut S::Session> {
        match (self.state, self.session.as_mut()) {
            (ScopeState::Open, Some(session)) => Ok(session),
            (state, _) => Err(DomainError::Transaction(format!("scope is {state}"))),
        }
    }
}

impl<S: DocumentStore> Drop for TransactionScope<S> {
    fn drop(&mut self) {
        if self.state == ScopeState::Open {
            tracing::warn!("transaction scope dropped while open, aborting");
            self.state = ScopeState::Aborted;
            // Backends discard staged writes when the session is dropped.
            self.session.take();
        }
    }
}

fn session<S: DocumentStore>(
    scope: Option<&mut TransactionScope<S>>,
) -> Result<Option<&mut S::Session>> {
    scope.map(|scope| scope.session_mut()).transpose()
}

/// Typed CRUD over the two record kinds, plus transaction scopes.
///
/// Every operation reads or writes through the store; nothing is cached.
/// Operations that take a scope stage their write in it; passing `None`
/// performs an independent, immediately visible write.
#[derive(Clone)]
pub struct StoreFacade<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> StoreFacade<S> {
    /// Creates a facade over the given store client.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates both collections and attaches the inventory validator.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        self.store
            .create_collection(Product::COLLECTION, InventoryGuard::collection_options())
            .await?;
        self.store
            .create_collection(Cart::COLLECTION, CollectionOptions::new())
            .await?;
        Ok(())
    }

    /// Inserts a record.
    #[tracing::instrument(skip_all, fields(collection = R::collection(), key = record.key()))]
    pub async fn insert<R: Record>(
        &self,
        record: &R,
        scope: Option<&mut TransactionScope<S>>,
    ) -> Result<()> {
        let document = serde_json::to_value(record)?;
        self.store
            .insert_one(R::collection(), document, session(scope)?)
            .await?;
        Ok(())
    }

    /// Applies `update` to the record matching `filter`.
    ///
    /// Fails with `NotFound` if nothing matches and with
    /// `ConstraintViolation` if the store's validator rejects the result.
    #[tracing::instrument(skip_all, fields(collection = R::collection(), %filter, %update))]
    pub async fn update_one<R: Record>(
        &self,
        filter: &Filter,
        update: &Update,
        scope: Option<&mut TransactionScope<S>>,
    ) -> Result<UpdateResult> {
        let result = self
            .store
            .update_one(R::collection(), filter, update, session(scope)?)
            .await?;

        if result.matched == 0 {
            return Err(DomainError::NotFound {
                collection: R::collection(),
                filter: filter.to_string(),
            });
        }
        Ok(result)
    }

    /// Returns every committed record of a kind.
    pub async fn find<R: Record>(&self) -> Result<Vec<R>> {
        Ok(self
            .store
            .find_as(R::collection(), &Filter::all(), None)
            .await?)
    }

    /// Returns the first record matching `filter`, as seen by the scope.
    pub async fn find_one<R: Record>(
        &self,
        filter: &Filter,
        scope: Option<&mut TransactionScope<S>>,
    ) -> Result<Option<R>> {
        match self
            .store
            .find_one(R::collection(), filter, session(scope)?)
            .await?
        {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Deletes every record of a kind.
    #[tracing::instrument(skip(self), fields(collection = R::collection()))]
    pub async fn delete_all<R: Record>(&self) -> Result<u64> {
        Ok(self
            .store
            .delete_many(R::collection(), &Filter::all(), None)
            .await?)
    }

    /// Opens a transaction scope.
    pub async fn begin_transaction(&self, options: TransactionOptions) -> Result<TransactionScope<S>> {
        let session = self
            .store
            .start_transaction(options)
            .await
            .map_err(|e| match DomainError::from(e) {
                DomainError::Connectivity(reason) => DomainError::Connectivity(reason),
                other => DomainError::Transaction(format!("could not start transaction: {other}")),
            })?;

        tracing::debug!(write_concern = ?options.write_concern, "transaction scope opened");
        Ok(TransactionScope {
            session: Some(session),
            state: ScopeState::Open,
            options,
        })
    }

    /// Commits the scope: every staged write becomes visible at once.
    ///
    /// On failure the scope ends `Aborted` and nothing it staged is visible.
    pub async fn commit(&self, scope: &mut TransactionScope<S>) -> Result<()> {
        if scope.state != ScopeState::Open {
            return Err(DomainError::Transaction(format!(
                "cannot commit a scope that is {}",
                scope.state
            )));
        }
        let Some(session) = scope.session.take() else {
            scope.state = ScopeState::Aborted;
            return Err(DomainError::Transaction("scope has no session".to_string()));
        };

        match self.store.commit_transaction(session).await {
            Ok(()) => {
                scope.state = ScopeState::Committed;
                tracing::debug!("transaction scope committed");
                Ok(())
            }
            Err(e) => {
                scope.state = ScopeState::Aborted;
                Err(match DomainError::from(e) {
                    err @ (DomainError::WriteConflict { .. } | DomainError::Connectivity(_)) => err,
                    DomainError::Transaction(reason) => DomainError::Transaction(reason),
                    other => DomainError::Transaction(format!("commit failed: {other}")),
                })
            }
        }
    }

    /// Aborts the scope, discarding every staged write.
    ///
    /// A no-op on a scope that already reached a terminal state, so it is safe
    /// on every exit path.
    pub async fn rollback(&self, scope: &mut TransactionScope<S>) -> Result<()> {
        if scope.state.is_terminal() {
            return Ok(());
        }
        scope.state = ScopeState::Aborted;
        let Some(session) = scope.session.take() else {
            return Ok(());
        };

        self.store.abort_transaction(session).await.map_err(|e| {
            tracing::warn!(error = %e, "abort was not acknowledged; staged writes are discarded");
            DomainError::Transaction(format!("abort failed: {e}"))
        })?;
        tracing::debug!("transaction scope aborted");
        Ok(())
    }
}
