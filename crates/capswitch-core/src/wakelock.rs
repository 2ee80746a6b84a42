//! Wake lock held for the lifetime of a capability switch session.
//!
//! The platform lock is not reference counted: acquire and release are
//! idempotent. [`WakeLockGuard`] ties the hold to a scope so every exit
//! path of a session (success, failure, abort, timeout) releases it exactly
//! once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub trait WakeLock: Send + Sync {
    fn acquire(&self);
    fn release(&self);
    fn is_held(&self) -> bool;
}

/// Holds `lock` until dropped.
pub struct WakeLockGuard {
    lock: Arc<dyn WakeLock>,
}

impl WakeLockGuard {
    pub fn acquire(lock: Arc<dyn WakeLock>) -> Self {
        lock.acquire();
        Self { lock }
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        if self.lock.is_held() {
            self.lock.release();
        }
    }
}

impl std::fmt::Debug for WakeLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeLockGuard")
            .field("held", &self.lock.is_held())
            .finish()
    }
}

/// In-process wake lock that records how often it was taken and dropped.
#[derive(Debug, Default)]
pub struct TrackedWakeLock {
    held: AtomicBool,
    acquisitions: AtomicU64,
    releases: AtomicU64,
}

impl TrackedWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of acquire calls that took the lock while it was free.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Number of release calls that freed a held lock.
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }
}

impl WakeLock for TrackedWakeLock {
    fn acquire(&self) {
        if !self.held.swap(true, Ordering::AcqRel) {
            self.acquisitions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::AcqRel) {
            self.releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let lock = Arc::new(TrackedWakeLock::new());
        {
            let _guard = WakeLockGuard::acquire(lock.clone());
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
        assert_eq!(lock.acquisitions(), 1);
        assert_eq!(lock.releases(), 1);
    }

    #[test]
    fn lock_is_not_reference_counted() {
        let lock = TrackedWakeLock::new();
        lock.acquire();
        lock.acquire();
        lock.release();
        assert!(!lock.is_held());
        lock.release();
        assert_eq!(lock.acquisitions(), 1);
        assert_eq!(lock.releases(), 1);
    }
}
