// In-process lease store
// Mirrors the lease/lock/revision model of the consensus store for tests and single-process use

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use dlock_common::{DLockError, Result};

use super::store::{LeaseStore, lock_key, lock_prefix};

/// Shortest lease the embedded store grants, in seconds
pub const EMBEDDED_MIN_TTL_SECS: i64 = 1;

const WAIT_POLL: Duration = Duration::from_millis(20);

struct KeyEntry {
    value: String,
    lease_id: i64,
    create_revision: i64,
}

#[derive(Default)]
struct State {
    next_lease: i64,
    revision: i64,
    leases: HashMap<i64, Instant>,
    keys: BTreeMap<String, KeyEntry>,
}

impl State {
    fn purge_expired(&mut self, now: Instant) -> bool {
        let expired: Vec<i64> = self
            .leases
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.drop_lease(*id);
        }
        !expired.is_empty()
    }

    fn drop_lease(&mut self, lease_id: i64) -> bool {
        let known = self.leases.remove(&lease_id).is_some();
        self.keys.retain(|_, entry| entry.lease_id != lease_id);
        known
    }

    fn under_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a KeyEntry> + 'a {
        self.keys
            .range(prefix.to_string()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(|(_, entry)| entry)
    }
}

/// Lease store kept in memory
#[derive(Default)]
pub struct EmbeddedLeaseStore {
    state: Mutex<State>,
    released: Notify,
}

impl EmbeddedLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leases still alive
    pub fn live_leases(&self) -> usize {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        state.leases.len()
    }

    fn try_lock(&self, name: &str, lease_id: i64) -> Result<Option<String>> {
        let mut state = self.state.lock();
        if state.purge_expired(Instant::now()) {
            self.released.notify_waiters();
        }
        if !state.leases.contains_key(&lease_id) {
            return Err(DLockError::LockAcquire(format!(
                "requested lease not found: {:x}",
                lease_id
            )));
        }

        let prefix = lock_prefix(name);
        if state.under_prefix(&prefix).next().is_some() {
            return Ok(None);
        }

        state.revision += 1;
        let create_revision = state.revision;
        let key = lock_key(name, lease_id);
        state.keys.insert(
            key.clone(),
            KeyEntry {
                value: String::new(),
                lease_id,
                create_revision,
            },
        );
        Ok(Some(key))
    }
}

#[async_trait]
impl LeaseStore for EmbeddedLeaseStore {
    async fn grant(&self, ttl_secs: i64) -> Result<i64> {
        let ttl = ttl_secs.max(EMBEDDED_MIN_TTL_SECS) as u64;
        let mut state = self.state.lock();
        state.next_lease += 1;
        let id = state.next_lease;
        state
            .leases
            .insert(id, Instant::now() + Duration::from_secs(ttl));
        Ok(id)
    }

    async fn lock(&self, name: &str, lease_id: i64) -> Result<String> {
        loop {
            let released = self.released.notified();
            if let Some(key) = self.try_lock(name, lease_id)? {
                return Ok(key);
            }
            // Expiry wakes nobody, so waiters also poll
            tokio::select! {
                _ = released => {}
                _ = tokio::time::sleep(WAIT_POLL) => {}
            }
        }
    }

    async fn put_owner(&self, lock_key: &str, owner_token: &str, lease_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        if !state.leases.contains_key(&lease_id) {
            return Err(DLockError::store(
                "lease.put",
                format!("requested lease not found: {:x}", lease_id),
            ));
        }

        state.revision += 1;
        let revision = state.revision;
        let entry = state
            .keys
            .entry(lock_key.to_string())
            .or_insert_with(|| KeyEntry {
                value: String::new(),
                lease_id,
                create_revision: revision,
            });
        entry.value = owner_token.to_string();
        entry.lease_id = lease_id;
        Ok(())
    }

    async fn unlock(&self, lock_key: &str) -> Result<()> {
        self.state.lock().keys.remove(lock_key);
        self.released.notify_waiters();
        Ok(())
    }

    async fn revoke(&self, lease_id: i64) -> Result<bool> {
        let known = {
            let mut state = self.state.lock();
            state.purge_expired(Instant::now());
            state.drop_lease(lease_id)
        };
        self.released.notify_waiters();
        Ok(known)
    }

    async fn holder(&self, name: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        let prefix = lock_prefix(name);
        Ok(state
            .under_prefix(&prefix)
            .min_by_key(|entry| entry.create_revision)
            .map(|entry| entry.value.clone()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
