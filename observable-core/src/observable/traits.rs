//! Observable contracts for the single-threaded model.

use std::rc::Rc;

use super::ObservableId;
use crate::error::{BoxError, Result};

/// Callback invoked with `(source, old_value, new_value)` after a value changed.
///
/// Returning an error aborts the remaining notifications of that update and
/// hands the error to whoever triggered it. Listeners should not fail.
pub type ListenerFn<V> = dyn Fn(ObservableId, &V, &V) -> Result<()>;

/// Strong handle to a change listener.
///
/// Observables only keep weak references to their listeners. The caller has
/// to hold on to this handle for as long as it wants to be notified.
pub type ChangeListener<V> = Rc<ListenerFn<V>>;

/// Validator run against every candidate value before it is stored.
pub type Validator<V> = dyn Fn(&V) -> std::result::Result<(), BoxError>;

/// Wrap a closure into a [`ChangeListener`].
pub fn listener<V, F>(f: F) -> ChangeListener<V>
where
    V: 'static,
    F: Fn(ObservableId, &V, &V) -> Result<()> + 'static,
{
    Rc::new(f)
}

/// A value that can be read and observed for changes.
pub trait ReadOnlyObservable {
    /// The type of the exposed value.
    type Value: Clone + PartialEq + 'static;

    /// Identity shared by all handles of this observable.
    fn id(&self) -> ObservableId;

    /// Get a copy of the current value.
    fn get(&self) -> Self::Value;

    /// Register a listener that is invoked whenever the value changes.
    ///
    /// Registering the same listener twice has no effect. The observable keeps
    /// only a weak reference to it.
    fn register_listener(&self, listener: &ChangeListener<Self::Value>);

    /// Remove a previously registered listener. Unknown listeners are ignored.
    fn remove_listener(&self, listener: &ChangeListener<Self::Value>);

    /// Turn this observable into a plain getter.
    fn as_supplier(&self) -> Box<dyn Fn() -> Self::Value>
    where
        Self: Sized + Clone + 'static,
    {
        let this = self.clone();
        Box::new(move || this.get())
    }
}

/// A writable observable that can take part in binding relationships.
///
/// An observable is in at most one of three binding modes at a time:
///
/// - unbound: `set` is permitted;
/// - bound to exactly one upstream through [`bind_to`](Self::bind_to), in
///   which case it mirrors the upstream and rejects `set`;
/// - bidirectionally bound to one or more peers, sharing the value with each
///   of them in both directions.
pub trait Observable: ReadOnlyObservable {
    /// Store a new value and notify listeners if it differs from the old one.
    ///
    /// Fails while bound to an upstream, or when the validator rejects the
    /// value. A rejected value leaves the observable untouched.
    fn set(&self, value: Self::Value) -> Result<()>;

    /// Whether no update of this observable is currently in flight.
    fn is_valid(&self) -> bool;

    /// Follow the value of `upstream` until [`unbind`](Self::unbind) is called.
    ///
    /// Adopts the upstream's current value immediately. Binding to the current
    /// upstream again is a no-op.
    fn bind_to<U>(&self, upstream: &U) -> Result<()>
    where
        U: ReadOnlyObservable<Value = Self::Value> + Clone + 'static;

    /// Share the value with `peer` in both directions.
    ///
    /// The initiating side adopts the peer's value. Binding an existing peer
    /// again is a no-op.
    fn bind_bidirectionally_to(&self, peer: &Self) -> Result<()>;

    /// Whether any binding relationship exists.
    fn is_bound(&self) -> bool;

    /// Whether this observable follows `upstream`.
    fn is_bound_to<U>(&self, upstream: &U) -> bool
    where
        U: ReadOnlyObservable + ?Sized;

    /// Whether at least one bidirectional relationship exists.
    fn is_bound_bidirectionally(&self) -> bool;

    /// Whether `peer` shares its value with this observable.
    fn is_bound_bidirectionally_to(&self, peer: &Self) -> bool;

    /// Stop following the upstream. The last value is kept.
    fn unbind(&self) -> Result<()>;

    /// Remove every binding relationship. The last value is kept.
    fn unbind_all(&self) -> Result<()>;

    /// Remove the bidirectional relationship with `peer` on both sides.
    fn unbind_bidirectional(&self, peer: &Self) -> Result<()>;
}
