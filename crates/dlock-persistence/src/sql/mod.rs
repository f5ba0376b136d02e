//! SQL-based lock repository (MySQL/PostgreSQL via SeaORM)
//!
//! Mutual exclusion comes from row locking: the existence check for an
//! active row runs as `SELECT .. FOR UPDATE` inside the same transaction as
//! the insert, so concurrent acquisitions of one name serialize on the
//! database. PostgreSQL takes no lock when that select matches nothing, so
//! there the transaction first takes `pg_advisory_xact_lock` on the name.
//! Lock waits are bounded only by the database's own lock wait timeout.

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Index, IndexCreateStatement};
use sea_orm::*;
use tracing::{debug, info};

use dlock_common::{DLockError, Result, current_unix_secs};

use crate::entity::dlock;
use crate::model::{LockRecord, NewLockRecord};
use crate::traits::LockRepository;

const BACKEND: &str = "relational";

/// External database lock repository
///
/// Wraps a SeaORM `DatabaseConnection` pool. The pool is shared by every
/// lock handle created over this repository.
pub struct SqlLockRepository {
    db: DatabaseConnection,
}

impl SqlLockRepository {
    /// Create a repository over an existing database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open a connection pool, ping it, and create the lock table if missing
    pub async fn connect(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut opt = ConnectOptions::new(url);
        opt.max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(connect_timeout)
            .acquire_timeout(connect_timeout)
            .sqlx_logging(false);

        info!(max_connections = max_connections, "start to init lock repository");

        let db = Database::connect(opt)
            .await
            .map_err(|e| connection_error(&e))?;
        db.ping().await.map_err(|e| connection_error(&e))?;
        info!("ping database successful");

        let repo = Self::new(db);
        repo.init_table().await?;
        Ok(repo)
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Take back the underlying database connection
    pub fn into_inner(self) -> DatabaseConnection {
        self.db
    }

    /// Create the lock table when it does not exist yet
    pub async fn init_table(&self) -> Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);
        let mut stmt = schema.create_table_from_entity(dlock::Entity);
        stmt.if_not_exists();
        // MySQL accepts inline index definitions; keeps FOR UPDATE scoped to one name
        if backend == DatabaseBackend::MySql {
            stmt.index(&mut name_expire_index());
        }

        self.db
            .execute(backend.build(&stmt))
            .await
            .map_err(|e| DLockError::store("dlock.create_table", e))?;

        if backend == DatabaseBackend::Postgres {
            let index = name_expire_index()
                .table(dlock::Entity)
                .if_not_exists()
                .to_owned();
            self.db
                .execute(backend.build(&index))
                .await
                .map_err(|e| DLockError::store("dlock.create_index", e))?;
        }
        debug!("lock table is ready");
        Ok(())
    }

    /// Serialize acquisitions of `name` for the rest of the transaction
    async fn lock_name<C: ConnectionTrait>(conn: &C, name: &str) -> Result<()> {
        let backend = conn.get_database_backend();
        if backend != DatabaseBackend::Postgres {
            return Ok(());
        }
        conn.execute(Statement::from_sql_and_values(
            backend,
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            [name.into()],
        ))
        .await
        .map_err(|e| DLockError::store("dlock.advisory_lock", e))?;
        Ok(())
    }

    fn active_query(name: &str, now_secs: i64) -> Select<dlock::Entity> {
        dlock::Entity::find()
            .filter(dlock::Column::Name.eq(name))
            .filter(dlock::Column::ExpireAt.gt(now_secs))
            .filter(dlock::Column::DeletedAt.is_null())
    }
}

fn name_expire_index() -> IndexCreateStatement {
    Index::create()
        .name("idx_dlock_name_expire")
        .col(dlock::Column::Name)
        .col(dlock::Column::ExpireAt)
        .to_owned()
}

fn connection_error(err: &DbErr) -> DLockError {
    tracing::error!("database connection failed: {}", err);
    DLockError::Connection {
        backend: BACKEND,
        message: err.to_string(),
    }
}

#[async_trait]
impl LockRepository for SqlLockRepository {
    async fn acquire(&self, record: NewLockRecord) -> Result<i64> {
        let tx = self
            .db
            .begin()
            .await
            .map_err(|e| DLockError::store("dlock.begin", e))?;

        Self::lock_name(&tx, &record.name).await?;

        let existing = Self::active_query(&record.name, current_unix_secs())
            .lock_exclusive()
            .one(&tx)
            .await
            .map_err(|e| DLockError::store("dlock.query", e))?;

        if let Some(existing) = existing {
            tx.rollback()
                .await
                .map_err(|e| DLockError::store("dlock.rollback", e))?;
            debug!(
                name = %record.name,
                holder_id = existing.id,
                "lock row already active"
            );
            return Err(DLockError::AlreadyExists(record.name));
        }

        let now = chrono::Local::now().naive_local();
        let entity = dlock::ActiveModel {
            created_at: Set(Some(now)),
            deleted_at: Set(None),
            name: Set(Some(record.name.clone())),
            lock_resource: Set(Some(record.owner_token)),
            host: Set(Some(record.host)),
            expire_at: Set(Some(record.expire_at)),
            ..Default::default()
        };

        let result = dlock::Entity::insert(entity)
            .exec(&tx)
            .await
            .map_err(|e| DLockError::store("dlock.insert", e))?;

        tx.commit()
            .await
            .map_err(|e| DLockError::store("dlock.commit", e))?;

        debug!(name = %record.name, id = result.last_insert_id, "lock row inserted");
        Ok(result.last_insert_id)
    }

    async fn find_active(&self, name: &str) -> Result<Option<LockRecord>> {
        let model = Self::active_query(name, current_unix_secs())
            .order_by_desc(dlock::Column::Id)
            .one(&self.db)
            .await
            .map_err(|e| DLockError::store("dlock.query", e))?;
        Ok(model.map(LockRecord::from))
    }

    async fn release(&self, name: &str, owner_token: Option<&str>) -> Result<u64> {
        let tx = self
            .db
            .begin()
            .await
            .map_err(|e| DLockError::store("dlock.begin", e))?;

        let active = Self::active_query(name, current_unix_secs())
            .lock_exclusive()
            .one(&tx)
            .await
            .map_err(|e| DLockError::store("dlock.query", e))?;

        let Some(active) = active else {
            tx.commit()
                .await
                .map_err(|e| DLockError::store("dlock.commit", e))?;
            debug!(name = %name, "no active lock row to release");
            return Ok(0);
        };

        if let Some(owner) = owner_token
            && active.lock_resource.as_deref() != Some(owner)
        {
            tx.rollback()
                .await
                .map_err(|e| DLockError::store("dlock.rollback", e))?;
            return Err(DLockError::NotOwner {
                key: name.to_string(),
                owner: owner.to_string(),
            });
        }

        let now = chrono::Local::now().naive_local();
        let result = dlock::Entity::update_many()
            .col_expr(dlock::Column::DeletedAt, Expr::value(now))
            .filter(dlock::Column::Id.eq(active.id))
            .exec(&tx)
            .await
            .map_err(|e| DLockError::store("dlock.update", e))?;

        tx.commit()
            .await
            .map_err(|e| DLockError::store("dlock.commit", e))?;

        debug!(name = %name, id = active.id, "lock row soft-deleted");
        Ok(result.rows_affected)
    }

    async fn health_check(&self) -> Result<()> {
        self.db
            .ping()
            .await
            .map_err(|e| DLockError::store("dlock.ping", e))
    }

    async fn close(&self) -> Result<()> {
        info!("closing lock repository connection pool");
        self.db
            .close_by_ref()
            .await
            .map_err(|e| DLockError::store("dlock.close", e))
    }
}
