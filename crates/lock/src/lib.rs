//! A three-mode (read / upgrade / write) lock with timeout — the only
//! concurrency primitive the engine uses.
//!
//! Built directly on [`parking_lot::RwLock`], whose upgradable-read
//! guard gives exactly the atomic promote-without-release operation
//! the engine needs: a command's `prepare` phase takes an upgrade
//! guard (compatible with concurrent readers, exclusive against other
//! upgraders), validates against the model, then promotes that same
//! guard to exclusive for `execute` — without ever dropping the lock
//! in between, which would let another writer interleave.
//!
//! The specification describes this contract with an explicit
//! `exit()` call matched against every `enter*`. In Rust the idiomatic
//! translation is RAII: [`ReadGuard`], [`UpgradeGuard`], and
//! [`WriteGuard`] release their mode in `Drop`, so release happens on
//! every exit path — including panics — without a manual call.

#![warn(missing_docs)]

use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors raised while acquiring a lock mode.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The requested mode could not be acquired within the configured
    /// timeout.
    #[error("lock acquisition timed out after {0:?}")]
    Timeout(Duration),
}

/// A three-mode reader/writer/upgrade lock with timeout.
///
/// Any number of [`ReadGuard`]s may be held concurrently. At most one
/// [`UpgradeGuard`] may be held at a time, and it is compatible with
/// concurrent readers. A [`WriteGuard`] excludes every other guard and
/// is obtained only by promoting an `UpgradeGuard` — there is no
/// direct `enter_write`, mirroring the specification's requirement
/// that an upgrade guard "must be held before calling enterWrite on
/// the same thread".
pub struct RwUpgradeLock {
    inner: RwLock<()>,
}

impl Default for RwUpgradeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RwUpgradeLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(()),
        }
    }

    /// Blocks until no writer holds the lock, then returns a shared
    /// read guard. Any number of readers may hold the lock
    /// simultaneously. Fails with [`LockError::Timeout`] if `timeout`
    /// elapses first.
    pub fn enter_read(&self, timeout: Duration) -> Result<ReadGuard<'_>, LockError> {
        self.inner
            .try_read_for(timeout)
            .map(ReadGuard)
            .ok_or_else(|| {
                tracing::warn!(?timeout, "read lock acquisition timed out");
                LockError::Timeout(timeout)
            })
    }

    /// Blocks until no other upgrade guard is held, then returns an
    /// upgrade guard. Compatible with existing readers — new readers
    /// may still be taken while an upgrade guard is held. Fails with
    /// [`LockError::Timeout`] if `timeout` elapses first.
    pub fn enter_upgrade(&self, timeout: Duration) -> Result<UpgradeGuard<'_>, LockError> {
        self.inner
            .try_upgradable_read_for(timeout)
            .map(UpgradeGuard)
            .ok_or_else(|| {
                tracing::warn!(?timeout, "upgrade lock acquisition timed out");
                LockError::Timeout(timeout)
            })
    }
}

/// A shared read guard. Releases the read mode when dropped.
pub struct ReadGuard<'a>(#[allow(dead_code)] RwLockReadGuard<'a, ()>);

/// An upgrade guard: compatible with concurrent readers, exclusive
/// against other upgraders. Releases the upgrade mode when dropped,
/// unless first promoted via [`enter_write`](UpgradeGuard::enter_write).
pub struct UpgradeGuard<'a>(RwLockUpgradableReadGuard<'a, ()>);

impl<'a> UpgradeGuard<'a> {
    /// Waits until all readers drain, then atomically promotes this
    /// upgrade guard to an exclusive write guard. The lock is never
    /// released between the upgrade hold and the write hold, so no
    /// other writer can interleave. Fails with [`LockError::Timeout`]
    /// if `timeout` elapses first, in which case the caller still
    /// holds the upgrade guard (it is returned unchanged via `self`
    /// having been consumed only on success).
    pub fn enter_write(self, timeout: Duration) -> Result<WriteGuard<'a>, LockError> {
        match RwLockUpgradableReadGuard::try_upgrade_for(self.0, timeout) {
            Ok(write) => Ok(WriteGuard(write)),
            Err(_still_upgradable) => {
                tracing::warn!(?timeout, "write lock promotion timed out");
                Err(LockError::Timeout(timeout))
            }
        }
    }
}

/// An exclusive write guard. Releases the write mode when dropped.
pub struct WriteGuard<'a>(#[allow(dead_code)] RwLockWriteGuard<'a, ()>);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(200);

    #[test]
    fn concurrent_readers_allowed() {
        let lock = RwUpgradeLock::new();
        let r1 = lock.enter_read(SHORT).unwrap();
        let r2 = lock.enter_read(SHORT).unwrap();
        drop(r1);
        drop(r2);
    }

    #[test]
    fn upgrade_compatible_with_existing_readers() {
        let lock = RwUpgradeLock::new();
        let _r = lock.enter_read(SHORT).unwrap();
        let _u = lock.enter_upgrade(SHORT).unwrap();
    }

    #[test]
    fn write_excludes_everything() {
        let lock = Arc::new(RwUpgradeLock::new());
        let u = lock.enter_upgrade(SHORT).unwrap();
        let w = u.enter_write(SHORT).unwrap();

        let lock2 = Arc::clone(&lock);
        let handle = thread::spawn(move || lock2.enter_read(Duration::from_millis(50)));
        assert!(matches!(handle.join().unwrap(), Err(LockError::Timeout(_))));
        drop(w);
    }

    #[test]
    fn write_promotion_times_out_while_reader_active() {
        let lock = RwUpgradeLock::new();
        let r = lock.enter_read(SHORT).unwrap();
        let u = lock.enter_upgrade(SHORT).unwrap();
        let result = u.enter_write(Duration::from_millis(50));
        assert!(matches!(result, Err(LockError::Timeout(_))));
        drop(r);
    }

    #[test]
    fn write_succeeds_after_reader_drains() {
        let lock = Arc::new(RwUpgradeLock::new());
        let r = lock.enter_read(SHORT).unwrap();
        let lock2 = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            let u = lock2.enter_upgrade(Duration::from_secs(1)).unwrap();
            u.enter_write(Duration::from_secs(1)).unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        drop(r);
        handle.join().unwrap();
    }
}
