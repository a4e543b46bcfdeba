//! Update State
//!
//! Every single-threaded observable tracks whether one of its own updates is
//! currently in flight. Binding listeners consult this state to drop the
//! callback that an update triggers on its own origin when it travels around
//! a cycle of bindings.
//!
//! The state is entered through [`UpdateGuard`], which restores the previous
//! state when dropped. This keeps the state consistent even if a validator,
//! listener or nested binding returns an error or panics.

use std::cell::Cell;

/// Whether an observable is in the middle of publishing one of its own updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateState {
    /// No update in flight.
    #[default]
    Idle,

    /// The value has been swapped and listeners are being notified.
    Updating,
}

/// Guard that returns the state to its previous value when dropped.
///
/// The state is restored, not cleared. A listener that sets the observable
/// it is notified by still sees `is_valid() == false` after its nested `set`
/// returns, because the outer update is still publishing. The observable
/// becomes valid again once the outermost update has finished.
pub(crate) struct UpdateGuard<'a> {
    state: &'a Cell<UpdateState>,
    previous: UpdateState,
}

impl<'a> UpdateGuard<'a> {
    /// Mark the state as [`UpdateState::Updating`] until the guard is dropped.
    pub(crate) fn enter(state: &'a Cell<UpdateState>) -> Self {
        let previous = state.replace(UpdateState::Updating);
        Self { state, previous }
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.state.set(self.previous);
    }
}
