//! Uniform lock contract, exercised against every backend's embedded store

use std::time::Duration;

use dlock_core::{DLockError, LockClient, LockKind};

const KINDS: [LockKind; 3] = [LockKind::Relational, LockKind::LeaseStore, LockKind::TtlCache];
const FIVE_MINUTES: Duration = Duration::from_secs(300);

#[tokio::test]
async fn test_acquire_contend_release_reacquire() {
    for kind in KINDS {
        let client = LockClient::embedded(kind);
        let lock = client.new_lock();
        // the lease store waits out its deadline, keep it short
        let contend_ttl = match kind {
            LockKind::LeaseStore => Duration::from_millis(200),
            _ => FIVE_MINUTES,
        };

        assert!(lock.acquire(FIVE_MINUTES, "job_id", "token-A", "host1").await.unwrap());

        let contended = lock.acquire(contend_ttl, "job_id", "token-B", "host2").await;
        match kind {
            LockKind::Relational => {
                let err = contended.unwrap_err();
                assert!(err.is_already_exists());
                assert_eq!(err.to_string(), "job_id is already exists");
            }
            LockKind::LeaseStore | LockKind::TtlCache => assert!(!contended.unwrap()),
        }

        lock.unlock("job_id").await.unwrap();
        assert!(
            lock.acquire(FIVE_MINUTES, "job_id", "token-B", "host2").await.unwrap(),
            "{} did not hand the lock over",
            kind
        );
        assert_eq!(
            lock.get_value("job_id").await.unwrap().as_deref(),
            Some("token-B")
        );
    }
}

#[tokio::test]
async fn test_value_round_trip() {
    for kind in KINDS {
        let client = LockClient::embedded(kind);
        let lock = client.new_lock();

        assert!(!lock.is_locked("job_id").await.unwrap());
        assert!(lock.get_value("job_id").await.unwrap().is_none());

        lock.acquire(FIVE_MINUTES, "job_id", "token-A", "host1").await.unwrap();
        assert!(lock.is_locked("job_id").await.unwrap());
        assert_eq!(
            lock.get_value("job_id").await.unwrap().as_deref(),
            Some("token-A")
        );
        assert_eq!(lock.lock_type(), kind);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exclusivity_under_concurrency() {
    for kind in KINDS {
        let client = LockClient::embedded(kind);
        let ttl = match kind {
            LockKind::LeaseStore => Duration::from_millis(300),
            _ => FIVE_MINUTES,
        };
        let mut tasks = Vec::new();
        for i in 0..8 {
            let lock = client.new_lock();
            tasks.push(tokio::spawn(async move {
                let owner = format!("token-{}", i);
                lock.acquire(ttl, "job_id", &owner, "host1").await
            }));
        }

        let mut winners = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(true) => winners += 1,
                Ok(false) => {}
                Err(e) => assert!(e.is_already_exists(), "{}: {}", kind, e),
            }
        }
        assert_eq!(winners, 1, "{} let {} owners in", kind, winners);
    }
}

#[tokio::test]
async fn test_lock_lapses_after_ttl() {
    for kind in KINDS {
        let client = LockClient::embedded(kind);
        let lock = client.new_lock();

        lock.acquire(Duration::from_millis(500), "job_id", "token-A", "host1")
            .await
            .unwrap();
        // relational expiry has whole-second resolution, the lease store a one second minimum
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(!lock.is_locked("job_id").await.unwrap(), "{} still locked", kind);

        let other = client.new_lock();
        assert!(other.acquire(FIVE_MINUTES, "job_id", "token-B", "host2").await.unwrap());
    }
}

#[tokio::test]
async fn test_relational_and_cache_release_is_idempotent() {
    for kind in [LockKind::Relational, LockKind::TtlCache] {
        let lock = LockClient::embedded(kind).new_lock();
        lock.acquire(FIVE_MINUTES, "job_id", "token-A", "host1").await.unwrap();
        lock.unlock("job_id").await.unwrap();
        lock.unlock("job_id").await.unwrap();
    }
}

#[tokio::test]
async fn test_owner_checked_release() {
    for kind in KINDS {
        let lock = LockClient::embedded(kind).new_lock();
        lock.acquire(FIVE_MINUTES, "job_id", "token-A", "host1").await.unwrap();

        let err = lock.unlock_owned("job_id", "token-B").await.unwrap_err();
        assert!(matches!(err, DLockError::NotOwner { .. }), "{}: {}", kind, err);
        assert!(lock.is_locked("job_id").await.unwrap());

        lock.unlock_owned("job_id", "token-A").await.unwrap();
        assert!(!lock.is_locked("job_id").await.unwrap());
    }
}

#[tokio::test]
async fn test_empty_key_rejected() {
    for kind in KINDS {
        let lock = LockClient::embedded(kind).new_lock();
        let err = lock
            .acquire(FIVE_MINUTES, "", "token-A", "host1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "caused: lock key is null");
        assert!(lock.is_locked("").await.is_err());
    }
}
