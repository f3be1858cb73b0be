use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::document::document_id;
use crate::{
    CollectionOptions, Document, DocumentStore, Filter, Result, StoreError, TransactionOptions,
    Update, UpdateResult, Validator,
};

/// Faults the in-memory store can be told to inject, each consumed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// The next operation of any kind fails as if the connection dropped.
    Connectivity,
    /// The next write inside a session fails with `WriteConflict`.
    WriteConflict,
    /// The next commit fails and the session is aborted.
    Commit,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    body: Document,
    /// Commit sequence number of the last write to this document.
    version: u64,
}

#[derive(Debug, Default)]
struct Collection {
    documents: BTreeMap<String, StoredDocument>,
    validator: Validator,
}

type DocKey = (String, String);

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<String, Collection>,
    /// Monotonic commit sequence.
    clock: u64,
    /// Documents with an uncommitted write, and the session holding them.
    write_locks: HashMap<DocKey, Uuid>,
    fail_points: Vec<FailPoint>,
}

impl StoreState {
    fn take_fail_point(&mut self, point: FailPoint) -> bool {
        match self.fail_points.iter().position(|p| *p == point) {
            Some(index) => {
                self.fail_points.remove(index);
                true
            }
            None => false,
        }
    }

    fn check_connectivity(&mut self) -> Result<()> {
        if self.take_fail_point(FailPoint::Connectivity) {
            return Err(StoreError::Connectivity(
                "connection reset by peer".to_string(),
            ));
        }
        Ok(())
    }

    fn committed_version(&self, collection: &str, id: &str) -> Option<u64> {
        self.collections
            .get(collection)
            .and_then(|c| c.documents.get(id))
            .map(|d| d.version)
    }

    fn validator(&self, collection: &str) -> Option<&Validator> {
        self.collections.get(collection).map(|c| &c.validator)
    }

    fn validate(&self, collection: &str, document: &Document) -> Result<()> {
        match self.validator(collection) {
            Some(validator) => validator.check(document).map_err(|violation| {
                StoreError::ValidationFailed {
                    collection: collection.to_string(),
                    field: violation.field,
                    rule: violation.rule.to_string(),
                }
            }),
            None => Ok(()),
        }
    }

    fn release_locks(&mut self, session_id: Uuid) {
        self.write_locks.retain(|_, holder| *holder != session_id);
    }
}

/// A write staged by a session, applied on commit.
#[derive(Debug, Clone)]
struct StagedWrite {
    /// `None` stages a delete.
    body: Option<Document>,
}

/// Open transaction against an [`InMemoryDocumentStore`].
///
/// Reads see the snapshot taken at start plus the session's own writes.
/// Dropping the session without committing aborts it.
pub struct InMemorySession {
    id: Uuid,
    options: TransactionOptions,
    /// Committed documents (with versions) as of the transaction start.
    snapshot: HashMap<String, BTreeMap<String, StoredDocument>>,
    writes: BTreeMap<DocKey, StagedWrite>,
    state: Arc<Mutex<StoreState>>,
    finished: bool,
}

impl InMemorySession {
    /// Returns the session's unique ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the options the transaction was started with.
    pub fn options(&self) -> TransactionOptions {
        self.options
    }

    /// Number of documents this session has written so far.
    pub fn staged_writes(&self) -> usize {
        self.writes.len()
    }

    fn snapshot_version(&self, collection: &str, id: &str) -> Option<u64> {
        self.snapshot
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|d| d.version)
    }

    /// The session's view of a collection: snapshot overlaid with own writes.
    fn view(&self, collection: &str) -> BTreeMap<String, Document> {
        let mut view: BTreeMap<String, Document> = self
            .snapshot
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, d)| (id.clone(), d.body.clone()))
                    .collect()
            })
            .unwrap_or_default();

        for ((coll, id), staged) in &self.writes {
            if coll != collection {
                continue;
            }
            match &staged.body {
                Some(body) => {
                    view.insert(id.clone(), body.clone());
                }
                None => {
                    view.remove(id);
                }
            }
        }
        view
    }

    /// Claims the write lock on a document, failing if another session holds
    /// it or if it was committed after this session's snapshot.
    fn claim(&self, state: &mut StoreState, collection: &str, id: &str) -> Result<()> {
        let key = (collection.to_string(), id.to_string());
        let conflict = || {
            metrics::counter!("document_store_write_conflicts_total").increment(1);
            StoreError::WriteConflict {
                collection: collection.to_string(),
                id: id.to_string(),
            }
        };

        if state.take_fail_point(FailPoint::WriteConflict) {
            return Err(conflict());
        }
        if let Some(holder) = state.write_locks.get(&key)
            && *holder != self.id
        {
            return Err(conflict());
        }
        if state.committed_version(collection, id) != self.snapshot_version(collection, id) {
            return Err(conflict());
        }
        state.write_locks.insert(key, self.id);
        Ok(())
    }

    fn stage(&mut self, collection: &str, id: &str, body: Option<Document>) {
        self.writes
            .insert((collection.to_string(), id.to_string()), StagedWrite { body });
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        if !self.finished {
            lock(&self.state).release_locks(self.id);
            tracing::debug!(session = %self.id, "uncommitted session dropped, writes discarded");
        }
    }
}

/// In-memory document store for tests and the default demo run.
///
/// Keeps every committed document with a commit sequence number, which gives
/// sessions snapshot isolation and first-writer-wins conflict detection.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot fault.
    pub fn inject(&self, point: FailPoint) {
        lock(&self.state).fail_points.push(point);
    }

    /// Returns the number of committed documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        lock(&self.state)
            .collections
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    /// Returns the number of documents currently locked by open sessions.
    pub fn locked_documents(&self) -> usize {
        lock(&self.state).write_locks.len()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        lock(&self.state)
    }

    fn insert_committed(&self, collection: &str, document: Document) -> Result<()> {
        let mut state = self.state();
        state.check_connectivity()?;
        let id = document_id(collection, &document)?.to_string();

        if state.write_locks.contains_key(&(collection.to_string(), id.clone())) {
            return Err(StoreError::WriteConflict {
                collection: collection.to_string(),
                id,
            });
        }
        if state.committed_version(collection, &id).is_some() {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        state.validate(collection, &document)?;

        state.clock += 1;
        let version = state.clock;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .documents
            .insert(
                id,
                StoredDocument {
                    body: document,
                    version,
                },
            );
        Ok(())
    }

    fn insert_staged(
        &self,
        collection: &str,
        document: Document,
        session: &mut InMemorySession,
    ) -> Result<()> {
        let mut state = self.state();
        state.check_connectivity()?;
        let id = document_id(collection, &document)?.to_string();

        if session.view(collection).contains_key(&id) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        state.validate(collection, &document)?;
        session.claim(&mut state, collection, &id)?;
        session.stage(collection, &id, Some(document));
        Ok(())
    }

    fn update_committed(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult> {
        let mut state = self.state();
        state.check_connectivity()?;

        let Some((id, current)) = state.collections.get(collection).and_then(|c| {
            c.documents
                .iter()
                .find(|(_, d)| filter.matches(&d.body))
                .map(|(id, d)| (id.clone(), d.body.clone()))
        }) else {
            return Ok(UpdateResult::default());
        };

        if state
            .write_locks
            .contains_key(&(collection.to_string(), id.clone()))
        {
            return Err(StoreError::WriteConflict {
                collection: collection.to_string(),
                id,
            });
        }

        let mut next = current.clone();
        update.apply(collection, &mut next, filter)?;
        state.validate(collection, &next)?;
        let modified = u64::from(next != current);

        state.clock += 1;
        let version = state.clock;
        if let Some(stored) = state
            .collections
            .get_mut(collection)
            .and_then(|c| c.documents.get_mut(&id))
        {
            stored.body = next;
            stored.version = version;
        }
        Ok(UpdateResult {
            matched: 1,
            modified,
        })
    }

    fn update_staged(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        session: &mut InMemorySession,
    ) -> Result<UpdateResult> {
        let mut state = self.state();
        state.check_connectivity()?;

        let Some((id, current)) = session
            .view(collection)
            .into_iter()
            .find(|(_, body)| filter.matches(body))
        else {
            return Ok(UpdateResult::default());
        };

        let mut next = current.clone();
        update.apply(collection, &mut next, filter)?;
        state.validate(collection, &next)?;
        session.claim(&mut state, collection, &id)?;
        let modified = u64::from(next != current);
        session.stage(collection, &id, Some(next));
        Ok(UpdateResult {
            matched: 1,
            modified,
        })
    }

    fn find_committed(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let mut state = self.state();
        state.check_connectivity()?;
        Ok(state
            .collections
            .get(collection)
            .map(|c| {
                c.documents
                    .values()
                    .filter(|d| filter.matches(&d.body))
                    .map(|d| d.body.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn find_staged(
        &self,
        collection: &str,
        filter: &Filter,
        session: &InMemorySession,
    ) -> Result<Vec<Document>> {
        self.state().check_connectivity()?;
        Ok(session
            .view(collection)
            .into_values()
            .filter(|body| filter.matches(body))
            .collect())
    }

    fn delete_committed(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut state = self.state();
        state.check_connectivity()?;

        let ids: Vec<String> = state
            .collections
            .get(collection)
            .map(|c| {
                c.documents
                    .iter()
                    .filter(|(_, d)| filter.matches(&d.body))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();

        if let Some(id) = ids
            .iter()
            .find(|id| state.write_locks.contains_key(&(collection.to_string(), (*id).clone())))
        {
            return Err(StoreError::WriteConflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        state.clock += 1;
        if let Some(c) = state.collections.get_mut(collection) {
            for id in &ids {
                c.documents.remove(id);
            }
        }
        Ok(ids.len() as u64)
    }

    fn delete_staged(
        &self,
        collection: &str,
        filter: &Filter,
        session: &mut InMemorySession,
    ) -> Result<u64> {
        let mut state = self.state();
        state.check_connectivity()?;

        let ids: Vec<String> = session
            .view(collection)
            .into_iter()
            .filter(|(_, body)| filter.matches(body))
            .map(|(id, _)| id)
            .collect();

        for id in &ids {
            session.claim(&mut state, collection, id)?;
            session.stage(collection, id, None);
        }
        Ok(ids.len() as u64)
    }

    fn begin(&self, options: TransactionOptions) -> Result<InMemorySession> {
        let mut state = self.state();
        state.check_connectivity()?;

        let snapshot = state
            .collections
            .iter()
            .map(|(name, c)| (name.clone(), c.documents.clone()))
            .collect();

        Ok(InMemorySession {
            id: Uuid::new_v4(),
            options,
            snapshot,
            writes: BTreeMap::new(),
            state: Arc::clone(&self.state),
            finished: false,
        })
    }

    fn commit(&self, mut session: InMemorySession) -> Result<()> {
        let mut state = self.state();
        session.finished = true;

        if state.take_fail_point(FailPoint::Commit) {
            state.release_locks(session.id);
            return Err(StoreError::Commit(
                "commit was not acknowledged".to_string(),
            ));
        }
        if let Err(e) = state.check_connectivity() {
            state.release_locks(session.id);
            return Err(e);
        }

        // Locks keep others out, but a stale snapshot must still never win.
        if let Some((collection, id)) = session.writes.keys().find(|(collection, id)| {
            state.committed_version(collection, id) != session.snapshot_version(collection, id)
        }) {
            state.release_locks(session.id);
            return Err(StoreError::WriteConflict {
                collection: collection.clone(),
                id: id.clone(),
            });
        }

        state.clock += 1;
        let version = state.clock;
        for ((collection, id), staged) in std::mem::take(&mut session.writes) {
            let documents = &mut state.collections.entry(collection).or_default().documents;
            match staged.body {
                Some(body) => {
                    documents.insert(id, StoredDocument { body, version });
                }
                None => {
                    documents.remove(&id);
                }
            }
        }
        state.release_locks(session.id);
        Ok(())
    }

    fn abort(&self, mut session: InMemorySession) {
        session.finished = true;
        self.state().release_locks(session.id);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    type Session = InMemorySession;

    async fn create_collection(&self, name: &str, options: CollectionOptions) -> Result<()> {
        let mut state = self.state();
        state.check_connectivity()?;
        state.collections.entry(name.to_string()).or_default().validator = options.validator;
        Ok(())
    }

    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&mut InMemorySession>,
    ) -> Result<()> {
        match session {
            Some(session) => self.insert_staged(collection, document, session),
            None => self.insert_committed(collection, document),
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        session: Option<&mut InMemorySession>,
    ) -> Result<UpdateResult> {
        match session {
            Some(session) => self.update_staged(collection, filter, update, session),
            None => self.update_committed(collection, filter, update),
        }
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&mut InMemorySession>,
    ) -> Result<Vec<Document>> {
        match session {
            Some(session) => self.find_staged(collection, filter, session),
            None => self.find_committed(collection, filter),
        }
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&mut InMemorySession>,
    ) -> Result<u64> {
        match session {
            Some(session) => self.delete_staged(collection, filter, session),
            None => self.delete_committed(collection, filter),
        }
    }

    async fn start_transaction(&self, options: TransactionOptions) -> Result<InMemorySession> {
        self.begin(options)
    }

    async fn commit_transaction(&self, session: InMemorySession) -> Result<()> {
        self.commit(session)
    }

    async fn abort_transaction(&self, session: InMemorySession) -> Result<()> {
        self.abort(session);
        Ok(())
    }
}
