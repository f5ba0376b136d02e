//! Command execution over one lock handle

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use tracing::info;

use dlock_core::{DLockError, DistributedLock};

use crate::cli::{Command, LockArgs};

/// Exit code for "lock held by someone else" and "no holder"
const EXIT_UNAVAILABLE: u8 = 1;

/// Run `command`, writing its result line to `out`
pub async fn execute(
    command: &Command,
    lock: &dyn DistributedLock,
    out: &mut impl Write,
) -> anyhow::Result<ExitCode> {
    match command {
        Command::Acquire(args) => {
            let owner = acquire(lock, args, out).await?;
            Ok(if owner.is_some() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_UNAVAILABLE)
            })
        }
        Command::Status(args) => {
            let locked = lock.is_locked(&args.key).await?;
            writeln!(out, "{}", if locked { "locked" } else { "unlocked" })?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Value(args) => match lock.get_value(&args.key).await? {
            Some(owner) => {
                writeln!(out, "{}", owner)?;
                Ok(ExitCode::SUCCESS)
            }
            None => Ok(ExitCode::from(EXIT_UNAVAILABLE)),
        },
        Command::Release { key, owner } => {
            match owner {
                Some(owner) => lock.unlock_owned(&key.key, owner).await?,
                None => lock.unlock(&key.key).await?,
            }
            writeln!(out, "released {}", key.key)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Hold(args) => {
            let Some(owner) = acquire(lock, args, out).await? else {
                return Ok(ExitCode::from(EXIT_UNAVAILABLE));
            };
            let interrupted = tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("listen for ctrl-c")?;
                    true
                }
                _ = tokio::time::sleep(args.ttl()) => false,
            };
            info!(key = %args.key, interrupted = interrupted, "releasing held lock");

            let released = lock
                .unlock_owned(&args.key, &owner)
                .await
                .with_context(|| format!("release {}", args.key));
            match released {
                Ok(()) => writeln!(out, "released {}", args.key)?,
                // the store already let the lock lapse
                Err(e) if !interrupted && is_ownership_error(&e) => {
                    writeln!(out, "expired {}", args.key)?
                }
                Err(e) => return Err(e),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Acquire per `args`; `None` when another owner holds the lock
async fn acquire(
    lock: &dyn DistributedLock,
    args: &LockArgs,
    out: &mut impl Write,
) -> anyhow::Result<Option<String>> {
    let owner = args.owner_token();
    let host = args.host_name();
    let acquired = match lock.acquire(args.ttl(), &args.key, &owner, &host).await {
        Ok(acquired) => acquired,
        Err(e) if e.is_already_exists() => false,
        Err(e) => return Err(e).with_context(|| format!("acquire {}", args.key)),
    };

    if acquired {
        writeln!(out, "acquired {} owner={} host={}", args.key, owner, host)?;
        Ok(Some(owner))
    } else {
        writeln!(out, "busy {}", args.key)?;
        Ok(None)
    }
}

/// True when the failure is a missing or stale ownership, not a store error
pub fn is_ownership_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<DLockError>(),
        Some(
            DLockError::NotOwner { .. }
                | DLockError::SessionNotFound(_)
                | DLockError::LeaseExpired(_)
        )
    )
}
