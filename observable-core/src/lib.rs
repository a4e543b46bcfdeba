//! Observable Core
//!
//! Observable values that notify listeners when they change and can be wired
//! together with bindings. It implements:
//!
//! - Observables with optional validators and equality-gated change
//!   notification
//! - Unidirectional bindings (a value follows an upstream) and bidirectional
//!   bindings (a group of values mirrors each other)
//! - Derived bindings recomputed whenever one of their dependencies changes
//! - Listener registries that never keep a listener alive
//!
//! # Architecture
//!
//! The crate is organized into two models with the same contract:
//!
//! - `observable`: single-threaded observables built on `Rc`/`RefCell`
//! - `concurrent`: thread-safe observables built on read/write and reentrant
//!   locks
//!
//! # Example
//!
//! ```rust
//! use observable_core::prelude::*;
//!
//! let first = SimpleObservable::new(String::from("Ada"));
//! let last = SimpleObservable::new(String::from("Lovelace"));
//!
//! let full_name = {
//!     let (first, last) = (first.clone(), last.clone());
//!     let deps = vec![first.clone().boxed(), last.clone().boxed()];
//!     Binding::new(
//!         move || format!("{} {}", first.get(), last.get()),
//!         deps,
//!     )
//! };
//!
//! let heading = SimpleObservable::new(String::new());
//! heading.bind_to(&full_name)?;
//! assert_eq!(heading.get(), "Ada Lovelace");
//!
//! first.set(String::from("Augusta"))?;
//! assert_eq!(heading.get(), "Augusta Lovelace");
//! # Ok::<(), observable_core::ObservableError>(())
//! ```

pub mod concurrent;
pub mod error;
pub mod observable;

pub use error::{BoxError, InvalidOperation, ObservableError, Result};
pub use observable::ObservableId;

/// Commonly used types and traits.
pub mod prelude {
    pub use crate::concurrent::{
        shared_listener, BlockingObservable, Fairness, SharedBinding, SharedDependency,
        SharedObservable, SharedReadOnlyObservable,
    };
    pub use crate::error::{InvalidOperation, ObservableError};
    pub use crate::observable::{
        listener, Binding, Dependency, Observable, ObservableId, ReadOnlyObservable,
        SimpleObservable,
    };
}
