//! Single-threaded Observables
//!
//! This module implements the unsynchronized observable model:
//!
//! - **SimpleObservable**: a value container that notifies listeners when its
//!   value changes and takes part in bindings.
//! - **Binding**: a derived value recomputed whenever one of its dependencies
//!   changes.
//! - **WeakListenerRegistry**: the listener set every observable uses; it
//!   never keeps a listener alive.
//!
//! # Bindings
//!
//! Observables can be wired together in two ways:
//!
//! ```text
//!   unidirectional            bidirectional
//!
//!   upstream ──▶ sink         a ◀──▶ b ◀──▶ c
//!   (sink rejects set)        (any member may set)
//! ```
//!
//! # Thread Safety
//!
//! Everything in this module is built on `Rc` and `RefCell` and is neither
//! `Send` nor `Sync`. Use [`crate::concurrent`] when observables are shared
//! between threads.

mod binding;
mod id;
mod registry;
mod simple;
mod state;
mod traits;

pub use binding::{Binding, Dependency, InvalidationFn, Subscription};
pub use id::ObservableId;
pub use registry::{Snapshot, WeakListenerRegistry};
pub use simple::SimpleObservable;
pub use state::UpdateState;
pub use traits::{listener, ChangeListener, ListenerFn, Observable, ReadOnlyObservable, Validator};
