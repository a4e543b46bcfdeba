//! Thread-safe Observables
//!
//! The lock-based model. Its types mirror the single-threaded ones in
//! [`crate::observable`]:
//!
//! | single-threaded           | thread-safe                  |
//! |---------------------------|------------------------------|
//! | `SimpleObservable`        | [`BlockingObservable`]       |
//! | `Binding`                 | [`SharedBinding`]            |
//! | `WeakListenerRegistry`    | [`WeakCopyOnWriteSet`]       |
//! | `Observable`              | [`SharedObservable`]         |
//! | `ReadOnlyObservable`      | [`SharedReadOnlyObservable`] |
//!
//! # Thread Safety
//!
//! Everything exported here is `Send + Sync`, and so are the values,
//! listeners and validators it accepts.
//!
//! The two models do not mix. A `SimpleObservable` cannot listen to a
//! `BlockingObservable` (its listeners are not `Send`), and the binding
//! methods of each model only accept observables of the same model. Bridging
//! the two by hand with a listener is possible, but the single-threaded side
//! must then only ever be touched from one thread.

mod binding;
mod blocking;
mod config;
mod lock;
mod registry;
mod traits;

pub use binding::{SharedBinding, SharedDependency, SharedInvalidationFn, SharedSubscription};
pub use blocking::BlockingObservable;
pub use config::{BlockingObservableBuilder, Fairness};
pub use registry::{SharedSnapshot, WeakCopyOnWriteSet};
pub use traits::{
    shared_listener, SharedChangeListener, SharedListenerFn, SharedObservable,
    SharedReadOnlyObservable, SharedValidator,
};
