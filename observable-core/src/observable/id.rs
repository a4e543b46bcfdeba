//! Observable identity.
//!
//! Handles to an observable are cheap clones that share state, so identity
//! cannot be derived from the handle's address. Every observable instead
//! receives an id when it is created, and all identity checks (bound-to
//! queries, peer sets, dependency de-duplication) compare ids.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier of an observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservableId(u64);

impl ObservableId {
    /// Generate a new unique id.
    ///
    /// Uses an atomic counter so ids stay unique across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObservableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObservableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let id1 = ObservableId::new();
        let id2 = ObservableId::new();
        let id3 = ObservableId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn display_uses_raw_value() {
        let id = ObservableId::new();
        assert_eq!(id.to_string(), format!("#{}", id.raw()));
    }
}
