// Embedded lock repository
// Provides the relational lock protocol in-process, without an external database

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use dlock_common::{DLockError, Result, current_unix_secs};

use crate::model::{LockRecord, NewLockRecord};
use crate::traits::LockRepository;

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: Vec<LockRecord>,
}

impl Table {
    fn active_mut(&mut self, name: &str, now_secs: i64) -> Option<&mut LockRecord> {
        self.rows
            .iter_mut()
            .rev()
            .find(|row| row.name == name && row.is_active_at(now_secs))
    }
}

/// Standalone lock table kept in memory
///
/// The table mutex plays the role of the row lock: the existence check and
/// the insert happen under one guard. Rows are soft-deleted like in the SQL
/// table and never physically removed.
#[derive(Default)]
pub struct EmbeddedLockRepository {
    table: Mutex<Table>,
}

impl EmbeddedLockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows ever written, including soft-deleted and expired ones
    pub fn rows(&self) -> Vec<LockRecord> {
        self.table.lock().rows.clone()
    }
}

#[async_trait]
impl LockRepository for EmbeddedLockRepository {
    async fn acquire(&self, record: NewLockRecord) -> Result<i64> {
        let mut table = self.table.lock();
        if table
            .active_mut(&record.name, current_unix_secs())
            .is_some()
        {
            return Err(DLockError::AlreadyExists(record.name));
        }

        table.next_id += 1;
        let id = table.next_id;
        table.rows.push(LockRecord {
            id,
            name: record.name,
            owner_token: record.owner_token,
            host: record.host,
            expire_at: record.expire_at,
            created_at: Some(chrono::Local::now().naive_local()),
            deleted_at: None,
        });
        debug!(id = id, "embedded lock row inserted");
        Ok(id)
    }

    async fn find_active(&self, name: &str) -> Result<Option<LockRecord>> {
        let mut table = self.table.lock();
        Ok(table.active_mut(name, current_unix_secs()).map(|row| row.clone()))
    }

    async fn release(&self, name: &str, owner_token: Option<&str>) -> Result<u64> {
        let mut table = self.table.lock();
        let Some(row) = table.active_mut(name, current_unix_secs()) else {
            return Ok(0);
        };

        if let Some(owner) = owner_token
            && !row.is_owned_by(owner)
        {
            return Err(DLockError::NotOwner {
                key: name.to_string(),
                owner: owner.to_string(),
            });
        }

        row.deleted_at = Some(chrono::Local::now().naive_local());
        Ok(1)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
