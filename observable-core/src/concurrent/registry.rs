//! Copy-on-write weak listener set.
//!
//! The thread-safe counterpart of
//! [`WeakListenerRegistry`](crate::observable::WeakListenerRegistry). The
//! entry list lives behind an [`ArcSwap`]: readers load the current list
//! without locking, writers build a new list and swap it in. A notification
//! pass walks the list it loaded at its start, so concurrent registrations
//! never disturb an iteration in progress.

use std::fmt;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{ObservableError, Result};

/// Live listeners collected for a single notification pass.
pub type SharedSnapshot<L> = SmallVec<[Arc<L>; 4]>;

/// A de-duplicated, thread-safe set of weakly held listeners.
pub struct WeakCopyOnWriteSet<L: ?Sized> {
    entries: ArcSwap<Vec<Weak<L>>>,
}

impl<L: ?Sized> WeakCopyOnWriteSet<L> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Register a listener. Returns `false` if it is already present.
    pub fn add(&self, listener: &Arc<L>) -> bool {
        let mut added = false;

        self.entries.rcu(|current| {
            let mut next: Vec<Weak<L>> = current
                .iter()
                .filter(|entry| entry.strong_count() > 0)
                .cloned()
                .collect();

            added = !next.iter().any(|entry| same_listener(entry, listener));
            if added {
                next.push(Arc::downgrade(listener));
            }
            next
        });

        added
    }

    /// Register a listener from a weak handle.
    ///
    /// Fails if the listener has already been dropped.
    pub fn add_weak(&self, listener: &Weak<L>) -> Result<bool> {
        let listener = listener.upgrade().ok_or(ObservableError::InvalidArgument(
            "cannot register a listener that has already been dropped",
        ))?;

        Ok(self.add(&listener))
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        if !self.contains(listener) {
            return false;
        }

        let mut removed = false;
        self.entries.rcu(|current| {
            removed = current.iter().any(|entry| same_listener(entry, listener));

            current
                .iter()
                .filter(|entry| entry.strong_count() > 0 && !same_listener(entry, listener))
                .cloned()
                .collect::<Vec<_>>()
        });

        removed
    }

    /// Check whether a listener is registered.
    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.purge();

        self.entries
            .load()
            .iter()
            .any(|entry| same_listener(entry, listener))
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.purge();
        self.entries.load().len()
    }

    /// Whether no live listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect strong handles to every live listener.
    pub fn snapshot(&self) -> SharedSnapshot<L> {
        self.purge();

        self.entries
            .load()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn purge(&self) {
        let dead = self
            .entries
            .load()
            .iter()
            .filter(|entry| entry.strong_count() == 0)
            .count();

        if dead == 0 {
            return;
        }

        self.entries.rcu(|current| {
            current
                .iter()
                .filter(|entry| entry.strong_count() > 0)
                .cloned()
                .collect::<Vec<_>>()
        });
        trace!(purged = dead, "purged dropped listeners");
    }
}

impl<L: ?Sized> Default for WeakCopyOnWriteSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for WeakCopyOnWriteSet<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCopyOnWriteSet")
            .field("len", &self.len())
            .finish()
    }
}

fn same_listener<L: ?Sized>(entry: &Weak<L>, listener: &Arc<L>) -> bool {
    entry.as_ptr().cast::<()>() == Arc::as_ptr(listener).cast::<()>()
}
