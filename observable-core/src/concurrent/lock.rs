//! Locks used by blocking observables.
//!
//! Each observable owns two locks:
//!
//! - [`StateLock`], a read/write lock around the value and binding state. It
//!   is held only for short sections and never while listeners run.
//! - [`UpdateLock`], a reentrant mutex held for the whole of every mutation,
//!   binding or unbinding operation, listener callbacks included. Readers on
//!   other threads take it too, so they wait until an update in flight has
//!   finished. The updating thread may re-enter (a listener reading or
//!   setting the observable it listens to).
//!
//! Both honour the observable's [`Fairness`] when they are released.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{
    ReentrantMutex, ReentrantMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use super::config::Fairness;

/// Read/write lock with closure-scoped access.
pub(crate) struct StateLock<T> {
    lock: RwLock<T>,
    fairness: Fairness,
}

impl<T> StateLock<T> {
    pub(crate) fn new(value: T, fairness: Fairness) -> Self {
        Self {
            lock: RwLock::new(value),
            fairness,
        }
    }

    /// Run `f` with shared access.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.lock.read();
        let result = f(&guard);

        if self.fairness.is_fair() {
            RwLockReadGuard::unlock_fair(guard);
        }

        result
    }

    /// Run `f` with exclusive access.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock.write();
        let result = f(&mut guard);

        if self.fairness.is_fair() {
            RwLockWriteGuard::unlock_fair(guard);
        }

        result
    }
}

/// Reentrant lock held for the whole of every update and every read.
///
/// Writers enter through [`lock`](Self::lock) and are counted, so
/// [`is_updating`](Self::is_updating) tells an update in flight apart from a
/// reader that holds the lock for a moment.
pub(crate) struct UpdateLock {
    mutex: ReentrantMutex<()>,
    updates: AtomicUsize,
    fairness: Fairness,
}

impl UpdateLock {
    pub(crate) fn new(fairness: Fairness) -> Self {
        Self {
            mutex: ReentrantMutex::new(()),
            updates: AtomicUsize::new(0),
            fairness,
        }
    }

    /// Block until this thread holds the lock for an update.
    pub(crate) fn lock(&self) -> UpdateLockGuard<'_> {
        let guard = self.mutex.lock();
        self.updates.fetch_add(1, Ordering::SeqCst);

        UpdateLockGuard {
            guard: Some(guard),
            updates: Some(&self.updates),
            fairness: self.fairness,
        }
    }

    /// Block until no other thread is updating, then hold the lock for a read.
    pub(crate) fn lock_read(&self) -> UpdateLockGuard<'_> {
        UpdateLockGuard {
            guard: Some(self.mutex.lock()),
            updates: None,
            fairness: self.fairness,
        }
    }

    /// Whether any thread, this one included, holds the lock for an update.
    pub(crate) fn is_updating(&self) -> bool {
        self.updates.load(Ordering::SeqCst) > 0
    }
}

/// Releases the [`UpdateLock`] on drop.
pub(crate) struct UpdateLockGuard<'a> {
    guard: Option<ReentrantMutexGuard<'a, ()>>,
    updates: Option<&'a AtomicUsize>,
    fairness: Fairness,
}

impl Drop for UpdateLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(updates) = self.updates {
            updates.fetch_sub(1, Ordering::SeqCst);
        }

        if let Some(guard) = self.guard.take() {
            if self.fairness.is_fair() {
                ReentrantMutexGuard::unlock_fair(guard);
            }
        }
    }
}
