use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};

use crate::document::document_id;
use crate::{
    CollectionOptions, Document, DocumentStore, Filter, Result, StoreError, TransactionOptions,
    Update, UpdateResult, Validator, WriteConcern,
};

/// Open transaction against a [`PostgresDocumentStore`].
///
/// Runs at `REPEATABLE READ`, PostgreSQL's snapshot isolation. Dropping the
/// session rolls the transaction back.
pub struct PostgresSession {
    tx: Transaction<'static, Postgres>,
    options: TransactionOptions,
}

impl PostgresSession {
    /// Returns the options the transaction was started with.
    pub fn options(&self) -> TransactionOptions {
        self.options
    }
}

/// PostgreSQL-backed document store.
///
/// Documents live as JSONB rows keyed by `(collection, id)`. Filters are
/// evaluated in process after narrowing by `_id` where the filter pins one;
/// writes lock their row with `SELECT ... FOR UPDATE`, so a concurrent write
/// to the same document either waits or fails with a serialization error.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await.map_err(connect_error)?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_validator(conn: &mut PgConnection, collection: &str) -> Result<Validator> {
        let validator: Option<Value> =
            sqlx::query_scalar("SELECT validator FROM collections WHERE name = $1")
                .bind(collection)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| classify(e, collection, "*"))?;

        match validator {
            Some(json) => Ok(serde_json::from_value(json)?),
            None => Ok(Validator::new()),
        }
    }

    async fn validate(conn: &mut PgConnection, collection: &str, document: &Document) -> Result<()> {
        let validator = Self::load_validator(conn, collection).await?;
        validator
            .check(document)
            .map_err(|violation| StoreError::ValidationFailed {
                collection: collection.to_string(),
                field: violation.field,
                rule: violation.rule.to_string(),
            })
    }

    async fn scan(
        conn: &mut PgConnection,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Document)>> {
        let rows = match filter.pinned_id() {
            Some(id) => {
                sqlx::query("SELECT id, body FROM documents WHERE collection = $1 AND id = $2")
                    .bind(collection)
                    .bind(id)
                    .fetch_all(&mut *conn)
                    .await
            }
            None => {
                sqlx::query("SELECT id, body FROM documents WHERE collection = $1 ORDER BY id")
                    .bind(collection)
                    .fetch_all(&mut *conn)
                    .await
            }
        }
        .map_err(|e| classify(e, collection, filter.pinned_id().unwrap_or("*")))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let body: Value = row.try_get("body")?;
            if filter.matches(&body) {
                documents.push((id, body));
            }
        }
        Ok(documents)
    }

    async fn lock_row(
        conn: &mut PgConnection,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>> {
        sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| classify(e, collection, id))
    }

    async fn exists(conn: &mut PgConnection, collection: &str, id: &str) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE collection = $1 AND id = $2)",
        )
        .bind(collection)
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| classify(e, collection, id))
    }

    async fn insert_in(
        conn: &mut PgConnection,
        collection: &str,
        document: Document,
        in_session: bool,
    ) -> Result<()> {
        let id = document_id(collection, &document)?.to_string();
        Self::validate(conn, collection, &document).await?;

        if in_session && Self::exists(conn, collection, &id).await? {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }

        let inserted =
            sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
                .bind(collection)
                .bind(&id)
                .bind(&document)
                .execute(&mut *conn)
                .await;
        match inserted {
            Ok(_) => Ok(()),
            // The id is not in this session's snapshot, so a concurrent
            // session created it first.
            Err(e) if in_session && sql_state(&e).as_deref() == Some("23505") => {
                metrics::counter!("document_store_write_conflicts_total").increment(1);
                Err(StoreError::WriteConflict {
                    collection: collection.to_string(),
                    id,
                })
            }
            Err(e) => Err(classify(e, collection, &id)),
        }
    }

    async fn update_in(
        conn: &mut PgConnection,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult> {
        for (id, _) in Self::scan(conn, collection, filter).await? {
            // Re-check under the row lock; the unlocked scan may be stale.
            let Some(current) = Self::lock_row(conn, collection, &id).await? else {
                continue;
            };
            if !filter.matches(&current) {
                continue;
            }

            let mut next = current.clone();
            update.apply(collection, &mut next, filter)?;
            Self::validate(conn, collection, &next).await?;
            if next == current {
                return Ok(UpdateResult {
                    matched: 1,
                    modified: 0,
                });
            }

            sqlx::query("UPDATE documents SET body = $3 WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(&id)
                .bind(&next)
                .execute(&mut *conn)
                .await
                .map_err(|e| classify(e, collection, &id))?;
            return Ok(UpdateResult {
                matched: 1,
                modified: 1,
            });
        }
        Ok(UpdateResult::default())
    }

    async fn delete_in(conn: &mut PgConnection, collection: &str, filter: &Filter) -> Result<u64> {
        let ids: Vec<String> = Self::scan(conn, collection, filter)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = ANY($2)")
            .bind(collection)
            .bind(&ids)
            .execute(&mut *conn)
            .await
            .map_err(|e| classify(e, collection, "*"))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    type Session = PostgresSession;

    async fn create_collection(&self, name: &str, options: CollectionOptions) -> Result<()> {
        let validator = serde_json::to_value(&options.validator)?;
        sqlx::query(
            r#"
            INSERT INTO collections (name, validator)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET validator = EXCLUDED.validator
            "#,
        )
        .bind(name)
        .bind(validator)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, name, "*"))?;
        Ok(())
    }

    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        session: Option<&mut PostgresSession>,
    ) -> Result<()> {
        match session {
            Some(session) => Self::insert_in(&mut session.tx, collection, document, true).await,
            None => {
                let mut tx = self.pool.begin().await.map_err(connect_error)?;
                Self::insert_in(&mut tx, collection, document, false).await?;
                tx.commit().await.map_err(commit_error)
            }
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        session: Option<&mut PostgresSession>,
    ) -> Result<UpdateResult> {
        match session {
            Some(session) => Self::update_in(&mut session.tx, collection, filter, update).await,
            None => {
                let mut tx = self.pool.begin().await.map_err(connect_error)?;
                let result = Self::update_in(&mut tx, collection, filter, update).await?;
                tx.commit().await.map_err(commit_error)?;
                Ok(result)
            }
        }
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&mut PostgresSession>,
    ) -> Result<Vec<Document>> {
        let documents = match session {
            Some(session) => Self::scan(&mut session.tx, collection, filter).await?,
            None => {
                let mut conn = self.pool.acquire().await.map_err(connect_error)?;
                Self::scan(&mut conn, collection, filter).await?
            }
        };
        Ok(documents.into_iter().map(|(_, body)| body).collect())
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&mut PostgresSession>,
    ) -> Result<u64> {
        match session {
            Some(session) => Self::delete_in(&mut session.tx, collection, filter).await,
            None => {
                let mut tx = self.pool.begin().await.map_err(connect_error)?;
                let deleted = Self::delete_in(&mut tx, collection, filter).await?;
                tx.commit().await.map_err(commit_error)?;
                Ok(deleted)
            }
        }
    }

    async fn start_transaction(&self, options: TransactionOptions) -> Result<PostgresSession> {
        let mut tx = self.pool.begin().await.map_err(connect_error)?;

        // Must be the first statement of the transaction.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(connect_error)?;

        let synchronous_commit = match options.write_concern {
            WriteConcern::Acknowledged => "SET LOCAL synchronous_commit = on",
            WriteConcern::Majority => "SET LOCAL synchronous_commit = remote_apply",
        };
        sqlx::query(synchronous_commit)
            .execute(&mut *tx)
            .await
            .map_err(connect_error)?;

        Ok(PostgresSession { tx, options })
    }

    async fn commit_transaction(&self, session: PostgresSession) -> Result<()> {
        session.tx.commit().await.map_err(commit_error)
    }

    async fn abort_transaction(&self, session: PostgresSession) -> Result<()> {
        session.tx.rollback().await.map_err(connect_error)
    }
}

fn is_transport(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn sql_state(error: &sqlx::Error) -> Option<String> {
    match error {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Maps a driver error raised while touching `collection/id`.
fn classify(error: sqlx::Error, collection: &str, id: &str) -> StoreError {
    if is_transport(&error) {
        return StoreError::Connectivity(error.to_string());
    }
    match sql_state(&error).as_deref() {
        // serialization_failure, deadlock_detected
        Some("40001") | Some("40P01") => {
            metrics::counter!("document_store_write_conflicts_total").increment(1);
            StoreError::WriteConflict {
                collection: collection.to_string(),
                id: id.to_string(),
            }
        }
        // unique_violation
        Some("23505") => StoreError::DuplicateKey {
            collection: collection.to_string(),
            id: id.to_string(),
        },
        _ => StoreError::Database(error),
    }
}

fn connect_error(error: sqlx::Error) -> StoreError {
    if is_transport(&error) {
        StoreError::Connectivity(error.to_string())
    } else {
        StoreError::Database(error)
    }
}

fn commit_error(error: sqlx::Error) -> StoreError {
    if is_transport(&error) {
        return StoreError::Connectivity(error.to_string());
    }
    match sql_state(&error).as_deref() {
        Some("40001") | Some("40P01") => StoreError::WriteConflict {
            collection: "*".to_string(),
            id: "*".to_string(),
        },
        _ => StoreError::Commit(error.to_string()),
    }
}
