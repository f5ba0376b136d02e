//! Domain model types for the lock repositories
//!
//! These types are used as arguments and return values of `LockRepository`,
//! decoupled from the SeaORM entity.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::entity::dlock;

/// A lock row as seen by the lock protocol
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub id: i64,
    pub name: String,
    /// Caller-supplied owner token (the `lock_resource` column)
    pub owner_token: String,
    pub host: String,
    /// Seconds since the Unix epoch
    pub expire_at: i64,
    pub created_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
}

impl LockRecord {
    /// A record holds its lock while it is not soft-deleted and not expired
    pub fn is_active_at(&self, now_secs: i64) -> bool {
        self.deleted_at.is_none() && self.expire_at > now_secs
    }

    pub fn is_owned_by(&self, owner_token: &str) -> bool {
        self.owner_token == owner_token
    }
}

impl From<dlock::Model> for LockRecord {
    fn from(model: dlock::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.unwrap_or_default(),
            owner_token: model.lock_resource.unwrap_or_default(),
            host: model.host.unwrap_or_default(),
            expire_at: model.expire_at.unwrap_or_default(),
            created_at: model.created_at,
            deleted_at: model.deleted_at,
        }
    }
}

/// Values for a lock row about to be inserted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLockRecord {
    pub name: String,
    pub owner_token: String,
    pub host: String,
    /// Seconds since the Unix epoch
    pub expire_at: i64,
}

impl NewLockRecord {
    pub fn new(
        name: impl Into<String>,
        owner_token: impl Into<String>,
        host: impl Into<String>,
        expire_at: i64,
    ) -> Self {
        Self {
            name: name.into(),
            owner_token: owner_token.into(),
            host: host.into(),
            expire_at,
        }
    }
}
