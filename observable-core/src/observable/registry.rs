//! Weak Listener Registry
//!
//! Observables must not keep their listeners alive. The registry stores
//! [`Weak`] handles only; whoever registers a listener keeps the strong
//! [`Rc`] and the listener stops receiving callbacks once that handle is
//! dropped.
//!
//! Expired entries are purged lazily. Every query (`contains`, `len`,
//! `snapshot`) first drops entries whose listener is gone and then operates on
//! the remainder. Purging is O(n) per call, which is fine for the small
//! listener sets observables carry.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{ObservableError, Result};

/// Live listeners collected for a single notification pass.
pub type Snapshot<L> = SmallVec<[Rc<L>; 4]>;

/// A de-duplicated set of weakly held listeners.
pub struct WeakListenerRegistry<L: ?Sized> {
    entries: RefCell<Vec<Weak<L>>>,
}

impl<L: ?Sized> WeakListenerRegistry<L> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Register a listener.
    ///
    /// Returns `false` if the same listener (by pointer identity) is already
    /// registered.
    pub fn add(&self, listener: &Rc<L>) -> bool {
        if self.contains(listener) {
            return false;
        }

        self.entries.borrow_mut().push(Rc::downgrade(listener));
        true
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
    pub fn remove(&self, listener: &Rc<L>) -> bool {
        self.purge();

        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| !same_listener(entry, listener));
        entries.len() != before
    }

    /// Check whether a listener is registered.
    pub fn contains(&self, listener: &Rc<L>) -> bool {
        self.purge();

        self.entries
            .borrow()
            .iter()
            .any(|entry| same_listener(entry, listener))
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.purge();
        self.entries.borrow().len()
    }

    /// Whether no live listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect strong handles to every live listener.
    ///
    /// The registry is not borrowed while the caller walks the snapshot, so
    /// listeners may register or remove listeners on the same registry.
    pub fn snapshot(&self) -> Snapshot<L> {
        self.purge();

        self.entries
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn purge(&self) {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.strong_count() > 0);

        let purged = before - entries.len();
        if purged > 0 {
            trace!(purged, remaining = entries.len(), "purged dropped listeners");
        }
    }
}

impl<L: ?Sized> Default for WeakListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for WeakListenerRegistry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

fn same_listener<L: ?Sized>(entry: &Weak<L>, listener: &Rc<L>) -> bool {
    entry.as_ptr().cast::<()>() == Rc::as_ptr(listener).cast::<()>()
}
