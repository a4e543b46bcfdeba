//! Observable contracts for the lock-based model.
//!
//! These mirror [`crate::observable::ReadOnlyObservable`] and
//! [`crate::observable::Observable`], with `Send + Sync` required of every
//! value, listener and validator.

use std::sync::Arc;

use crate::error::{BoxError, Result};
use crate::observable::ObservableId;

/// Thread-safe change callback, invoked with `(source, old_value, new_value)`.
pub type SharedListenerFn<V> = dyn Fn(ObservableId, &V, &V) -> Result<()> + Send + Sync;

/// Strong handle to a thread-safe change listener.
pub type SharedChangeListener<V> = Arc<SharedListenerFn<V>>;

/// Thread-safe validator.
pub type SharedValidator<V> = dyn Fn(&V) -> std::result::Result<(), BoxError> + Send + Sync;

/// Wrap a closure into a [`SharedChangeListener`].
pub fn shared_listener<V, F>(f: F) -> SharedChangeListener<V>
where
    V: 'static,
    F: Fn(ObservableId, &V, &V) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A thread-safe value that can be read and observed for changes.
pub trait SharedReadOnlyObservable: Send + Sync {
    /// The type of the exposed value.
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// Identity shared by all handles of this observable.
    fn id(&self) -> ObservableId;

    /// Get a copy of the current value.
    fn get(&self) -> Self::Value;

    /// Register a listener. The observable keeps only a weak reference to it.
    fn register_listener(&self, listener: &SharedChangeListener<Self::Value>);

    /// Remove a previously registered listener.
    fn remove_listener(&self, listener: &SharedChangeListener<Self::Value>);

    /// Turn this observable into a plain getter.
    fn as_supplier(&self) -> Box<dyn Fn() -> Self::Value + Send + Sync>
    where
        Self: Sized + Clone + 'static,
    {
        let this = self.clone();
        Box::new(move || this.get())
    }
}

/// A writable, thread-safe observable that can take part in bindings.
///
/// The operations have the same meaning as on
/// [`Observable`](crate::observable::Observable).
pub trait SharedObservable: SharedReadOnlyObservable {
    /// Store a new value and notify listeners if it differs from the old one.
    fn set(&self, value: Self::Value) -> Result<()>;

    /// Whether no thread is currently updating this observable.
    fn is_valid(&self) -> bool;

    /// Follow the value of `upstream`.
    fn bind_to<U>(&self, upstream: &U) -> Result<()>
    where
        U: SharedReadOnlyObservable<Value = Self::Value> + Clone + 'static;

    /// Share the value with `peer` in both directions.
    fn bind_bidirectionally_to(&self, peer: &Self) -> Result<()>;

    /// Whether any binding relationship exists.
    fn is_bound(&self) -> bool;

    /// Whether this observable follows `upstream`.
    fn is_bound_to<U>(&self, upstream: &U) -> bool
    where
        U: SharedReadOnlyObservable + ?Sized;

    /// Whether at least one bidirectional relationship exists.
    fn is_bound_bidirectionally(&self) -> bool;

    /// Whether `peer` shares its value with this observable.
    fn is_bound_bidirectionally_to(&self, peer: &Self) -> bool;

    /// Stop following the upstream.
    fn unbind(&self) -> Result<()>;

    /// Remove every binding relationship.
    fn unbind_all(&self) -> Result<()>;

    /// Remove the bidirectional relationship with `peer` on both sides.
    fn unbind_bidirectional(&self, peer: &Self) -> Result<()>;
}
