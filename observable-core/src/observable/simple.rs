//! Simple Observable
//!
//! The default, unsynchronized observable. All state lives behind an `Rc`, so
//! handles are cheap to clone and every clone refers to the same value,
//! listeners and bindings.
//!
//! # How Updates Work
//!
//! 1. The validator (if any) checks the candidate value. A rejection aborts
//!    the update before anything changes.
//!
//! 2. The observable enters [`UpdateState::Updating`] and swaps in the value.
//!
//! 3. If the new value differs from the old one, every live listener is
//!    called with `(id, old, new)`.
//!
//! 4. The previous update state is restored, whatever happened in step 3.
//!
//! # Bindings
//!
//! Every observable owns a single binding listener. Binding to an upstream or
//! to a peer registers that listener on the other observable; when it fires
//! it copies the new value into its owner. While its owner is `Updating` the
//! listener ignores callbacks. That is what stops an update from travelling
//! around a ring of bidirectional bindings forever: it reaches every member
//! once and is dropped when it arrives back at its origin.
//!
//! Upstreams are held strongly, bidirectional peers weakly. A ring of
//! unidirectional bindings therefore forms a reference cycle and keeps its
//! members alive until one of them is unbound.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::registry::WeakListenerRegistry;
use super::state::{UpdateGuard, UpdateState};
use super::traits::{listener, ChangeListener, ListenerFn, Observable, ReadOnlyObservable, Validator};
use super::ObservableId;
use crate::error::{BoxError, InvalidOperation, ObservableError, Result};

/// Binding mode of an observable. The variants are mutually exclusive.
enum BindingState<V>
where
    V: Clone + PartialEq + 'static,
{
    Unbound,
    Unidirectional(Box<dyn ReadOnlyObservable<Value = V>>),
    /// Never empty. Removing the last peer switches back to `Unbound`.
    Bidirectional(IndexMap<ObservableId, Weak<Inner<V>>>),
}

struct Inner<V>
where
    V: Clone + PartialEq + 'static,
{
    id: ObservableId,
    value: RefCell<V>,
    validator: Option<Box<Validator<V>>>,
    listeners: WeakListenerRegistry<ListenerFn<V>>,
    state: Cell<UpdateState>,
    binding: RefCell<BindingState<V>>,
    /// Registered on upstreams and peers; copies their changes into `value`.
    binding_listener: ChangeListener<V>,
}

/// A single-threaded observable value.
///
/// # Example
///
/// ```rust
/// use observable_core::prelude::*;
///
/// let celsius = SimpleObservable::new(20);
/// let display = SimpleObservable::new(0);
///
/// display.bind_to(&celsius)?;
/// assert_eq!(display.get(), 20);
///
/// celsius.set(25)?;
/// assert_eq!(display.get(), 25);
/// # Ok::<(), observable_core::ObservableError>(())
/// ```
pub struct SimpleObservable<V>
where
    V: Clone + PartialEq + 'static,
{
    inner: Rc<Inner<V>>,
}

impl<V> SimpleObservable<V>
where
    V: Clone + PartialEq + 'static,
{
    /// Create an observable with the given initial value.
    pub fn new(value: V) -> Self {
        Self::build(None, value)
    }

    /// Create an observable whose values must pass `validator`.
    ///
    /// The initial value is not validated.
    pub fn with_validator<F>(validator: F, value: V) -> Self
    where
        F: Fn(&V) -> std::result::Result<(), BoxError> + 'static,
    {
        Self::build(Some(Box::new(validator)), value)
    }

    fn build(validator: Option<Box<Validator<V>>>, value: V) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<Inner<V>>| {
            let owner = weak.clone();
            let binding_listener = listener(move |_source, _old, new: &V| match owner.upgrade() {
                Some(inner) => inner.on_binding_change(new),
                None => Ok(()),
            });

            Inner {
                id: ObservableId::new(),
                value: RefCell::new(value),
                validator,
                listeners: WeakListenerRegistry::new(),
                state: Cell::new(UpdateState::Idle),
                binding: RefCell::new(BindingState::Unbound),
                binding_listener,
            }
        });

        Self { inner }
    }

    /// Replace the value with one derived from the current value.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&V) -> V,
    {
        let value = f(&self.inner.value.borrow());
        self.set(value)
    }

    /// Current update state.
    pub fn update_state(&self) -> UpdateState {
        self.inner.state.get()
    }

    /// Number of live listeners, including binding listeners of other observables.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    fn from_inner(inner: Rc<Inner<V>>) -> Self {
        Self { inner }
    }

    fn has_upstream(&self) -> bool {
        matches!(*self.inner.binding.borrow(), BindingState::Unidirectional(_))
    }
}

impl<V> Inner<V>
where
    V: Clone + PartialEq + 'static,
{
    fn on_binding_change(&self, value: &V) -> Result<()> {
        if self.state.get() == UpdateState::Updating {
            trace!(id = %self.id, "ignoring binding callback during own update");
            return Ok(());
        }

        self.set_internal(value.clone())
    }

    /// Store a value without checking the binding state.
    fn set_internal(&self, value: V) -> Result<()> {
        self.validate(&value)?;
        self.commit(value)
    }

    fn validate(&self, value: &V) -> Result<()> {
        match &self.validator {
            Some(validator) => validator(value).map_err(ObservableError::ValidationRejected),
            None => Ok(()),
        }
    }

    fn commit(&self, value: V) -> Result<()> {
        let _guard = UpdateGuard::enter(&self.state);

        let new_value = value.clone();
        let old_value = self.value.replace(value);

        if old_value != new_value {
            self.publish(&old_value, &new_value)?;
        }

        Ok(())
    }

    fn publish(&self, old_value: &V, new_value: &V) -> Result<()> {
        let listeners = self.listeners.snapshot();
        trace!(id = %self.id, listeners = listeners.len(), "publishing change");

        for listener in listeners {
            listener(self.id, old_value, new_value)?;
        }

        Ok(())
    }

    /// Live bidirectional peers. Dropped peers are forgotten.
    fn live_peers(&self) -> Vec<Rc<Inner<V>>> {
        let mut binding = self.binding.borrow_mut();

        let BindingState::Bidirectional(peers) = &mut *binding else {
            return Vec::new();
        };

        peers.retain(|_, peer| peer.strong_count() > 0);
        let live: Vec<_> = peers.values().filter_map(Weak::upgrade).collect();

        if peers.is_empty() {
            *binding = BindingState::Unbound;
        }

        live
    }

    fn forget_peer(&self, peer: ObservableId) {
        let mut binding = self.binding.borrow_mut();

        if let BindingState::Bidirectional(peers) = &mut *binding {
            peers.shift_remove(&peer);
            if peers.is_empty() {
                *binding = BindingState::Unbound;
            }
        }
    }
}

impl<V> ReadOnlyObservable for SimpleObservable<V>
where
    V: Clone + PartialEq + 'static,
{
    type Value = V;

    fn id(&self) -> ObservableId {
        self.inner.id
    }

    fn get(&self) -> V {
        self.inner.value.borrow().clone()
    }

    fn register_listener(&self, listener: &ChangeListener<V>) {
        self.inner.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &ChangeListener<V>) {
        self.inner.listeners.remove(listener);
    }
}

impl<V> Observable for SimpleObservable<V>
where
    V: Clone + PartialEq + 'static,
{
    fn set(&self, value: V) -> Result<()> {
        if self.has_upstream() {
            return Err(InvalidOperation::BoundToUpstream.into());
        }

        self.inner.set_internal(value)
    }

    fn is_valid(&self) -> bool {
        self.inner.state.get() == UpdateState::Idle
    }

    fn bind_to<U>(&self, upstream: &U) -> Result<()>
    where
        U: ReadOnlyObservable<Value = V> + Clone + 'static,
    {
        if upstream.id() == self.id() {
            return Err(ObservableError::InvalidArgument(
                "cannot bind an observable to itself",
            ));
        }

        match &*self.inner.binding.borrow() {
            BindingState::Unidirectional(current) if current.id() == upstream.id() => {
                return Ok(());
            }
            BindingState::Unidirectional(_) => return Err(InvalidOperation::AlreadyBound.into()),
            _ => {}
        }

        // A peer set may only contain dropped peers, which do not count
        if !self.inner.live_peers().is_empty() {
            return Err(InvalidOperation::AlreadyBound.into());
        }

        let value = upstream.get();
        self.inner.validate(&value)?;

        upstream.register_listener(&self.inner.binding_listener);
        *self.inner.binding.borrow_mut() = BindingState::Unidirectional(Box::new(upstream.clone()));
        debug!(id = %self.id(), upstream = %upstream.id(), "bound to upstream");

        self.inner.commit(value)
    }

    fn bind_bidirectionally_to(&self, peer: &Self) -> Result<()> {
        if peer.id() == self.id() {
            return Err(ObservableError::InvalidArgument(
                "cannot bind an observable to itself",
            ));
        }

        match &*self.inner.binding.borrow() {
            BindingState::Unidirectional(_) => return Err(InvalidOperation::AlreadyBound.into()),
            BindingState::Bidirectional(peers) if peers.contains_key(&peer.id()) => return Ok(()),
            _ => {}
        }

        if peer.has_upstream() {
            return Err(InvalidOperation::AlreadyBound.into());
        }

        // Only the initiating side adopts a value; the mirror call finds itself
        // already listed by its peer and keeps the value it was just given
        let adopted = if peer.is_bound_bidirectionally_to(self) {
            None
        } else {
            let value = peer.get();
            self.inner.validate(&value)?;
            Some(value)
        };

        {
            let mut binding = self.inner.binding.borrow_mut();
            let entry = Rc::downgrade(&peer.inner);

            match &mut *binding {
                BindingState::Bidirectional(peers) => {
                    peers.insert(peer.id(), entry);
                }
                _ => {
                    let mut peers = IndexMap::new();
                    peers.insert(peer.id(), entry);
                    *binding = BindingState::Bidirectional(peers);
                }
            }
        }

        peer.register_listener(&self.inner.binding_listener);
        debug!(id = %self.id(), peer = %peer.id(), "bound bidirectionally");

        if let Some(value) = adopted {
            self.inner.commit(value)?;
        }

        peer.bind_bidirectionally_to(self)
    }

    fn is_bound(&self) -> bool {
        match &*self.inner.binding.borrow() {
            BindingState::Unbound => false,
            BindingState::Unidirectional(_) => true,
            BindingState::Bidirectional(peers) => peers.values().any(|peer| peer.strong_count() > 0),
        }
    }

    fn is_bound_to<U>(&self, upstream: &U) -> bool
    where
        U: ReadOnlyObservable + ?Sized,
    {
        match &*self.inner.binding.borrow() {
            BindingState::Unidirectional(current) => current.id() == upstream.id(),
            _ => false,
        }
    }

    fn is_bound_bidirectionally(&self) -> bool {
        match &*self.inner.binding.borrow() {
            BindingState::Bidirectional(peers) => peers.values().any(|peer| peer.strong_count() > 0),
            _ => false,
        }
    }

    fn is_bound_bidirectionally_to(&self, peer: &Self) -> bool {
        match &*self.inner.binding.borrow() {
            BindingState::Bidirectional(peers) => peers.contains_key(&peer.id()),
            _ => false,
        }
    }

    fn unbind(&self) -> Result<()> {
        let previous = self.inner.binding.replace(BindingState::Unbound);

        let upstream = match previous {
            BindingState::Unidirectional(upstream) => upstream,
            other => {
                self.inner.binding.replace(other);
                return Err(InvalidOperation::NotBound.into());
            }
        };

        upstream.remove_listener(&self.inner.binding_listener);
        debug!(id = %self.id(), upstream = %upstream.id(), "unbound from upstream");
        Ok(())
    }

    fn unbind_all(&self) -> Result<()> {
        if self.has_upstream() {
            return self.unbind();
        }

        let peers = self.inner.live_peers();
        if peers.is_empty() {
            return Err(InvalidOperation::NoBindings.into());
        }

        for peer in peers {
            self.unbind_bidirectional(&Self::from_inner(peer))?;
        }

        Ok(())
    }

    fn unbind_bidirectional(&self, peer: &Self) -> Result<()> {
        if !self.is_bound_bidirectionally_to(peer) {
            return Err(InvalidOperation::NotBoundTo(peer.id()).into());
        }

        peer.remove_listener(&self.inner.binding_listener);
        self.inner.forget_peer(peer.id());
        debug!(id = %self.id(), peer = %peer.id(), "removed bidirectional binding");

        // Tear down the mirror; the reciprocal check ends the recursion there
        if peer.is_bound_bidirectionally_to(self) {
            peer.unbind_bidirectional(self)?;
        }

        Ok(())
    }
}

impl<V> Clone for SimpleObservable<V>
where
    V: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> Default for SimpleObservable<V>
where
    V: Clone + PartialEq + Default + 'static,
{
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V> fmt::Debug for SimpleObservable<V>
where
    V: Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleObservable")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("state", &self.inner.state.get())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<V: Clone + 'static>() -> (ChangeListener<V>, Rc<RefCell<Vec<(V, V)>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let calls_clone = Rc::clone(&calls);
        let listener = listener(move |_, old: &V, new: &V| {
            calls_clone.borrow_mut().push((old.clone(), new.clone()));
            Ok(())
        });
        (listener, calls)
    }

    #[test]
    fn get_and_set() {
        let observable = SimpleObservable::new(0);
        assert_eq!(observable.get(), 0);

        observable.set(42).unwrap();
        assert_eq!(observable.get(), 42);
    }

    #[test]
    fn update_derives_from_current_value() {
        let observable = SimpleObservable::new(10);
        observable.update(|v| v + 5).unwrap();
        assert_eq!(observable.get(), 15);
    }

    #[test]
    fn listeners_receive_old_and_new_value() {
        let observable = SimpleObservable::new(Some("a"));
        let (listener, calls) = recorder();
        observable.register_listener(&listener);

        observable.set(Some("b")).unwrap();
        observable.set(None).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![(Some("a"), Some("b")), (Some("b"), None)]
        );
    }

    #[test]
    fn equal_values_are_not_published() {
        let observable = SimpleObservable::new(None::<String>);
        let (listener, calls) = recorder();
        observable.register_listener(&listener);

        observable.set(None).unwrap();
        observable.set(Some("x".to_string())).unwrap();
        observable.set(Some("x".to_string())).unwrap();

        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn listener_receives_source_id() {
        let observable = SimpleObservable::new(0);
        let seen = Rc::new(Cell::new(None));
        let seen_clone = Rc::clone(&seen);
        let listener = listener(move |source, _, _: &i32| {
            seen_clone.set(Some(source));
            Ok(())
        });
        observable.register_listener(&listener);

        observable.set(1).unwrap();
        assert_eq!(seen.get(), Some(observable.id()));
    }

    #[test]
    fn removed_listener_is_not_called() {
        let observable = SimpleObservable::new(0);
        let (listener, calls) = recorder();
        observable.register_listener(&listener);

        observable.set(1).unwrap();
        observable.remove_listener(&listener);
        observable.set(2).unwrap();

        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn dropped_listener_is_not_called() {
        let observable = SimpleObservable::new(0);
        let (listener, calls) = recorder();
        observable.register_listener(&listener);
        assert_eq!(observable.listener_count(), 1);

        drop(listener);
        observable.set(1).unwrap();

        assert!(calls.borrow().is_empty());
        assert_eq!(observable.listener_count(), 0);
    }

    #[test]
    fn state_is_updating_during_publication() {
        let observable = SimpleObservable::new(0);
        let observed = Rc::new(Cell::new(None));

        let observable_clone = observable.clone();
        let observed_clone = Rc::clone(&observed);
        let listener = listener(move |_, _, _: &i32| {
            observed_clone.set(Some(observable_clone.is_valid()));
            Ok(())
        });
        observable.register_listener(&listener);

        assert!(observable.is_valid());
        observable.set(1).unwrap();

        assert_eq!(observed.get(), Some(false));
        assert!(observable.is_valid());
        assert_eq!(observable.update_state(), UpdateState::Idle);
    }

    #[test]
    fn failing_listener_aborts_publication_and_restores_state() {
        let observable = SimpleObservable::new(0);
        let failing = listener(|_, _, _: &i32| Err(ObservableError::InvalidArgument("boom")));
        observable.register_listener(&failing);

        let error = observable.set(1).unwrap_err();
        assert!(matches!(error, ObservableError::InvalidArgument("boom")));

        // The value was stored before the listener ran
        assert_eq!(observable.get(), 1);
        assert!(observable.is_valid());
    }

    #[test]
    fn validator_rejection_keeps_value() {
        let observable = SimpleObservable::with_validator(
            |v: &i32| {
                if *v < 0 {
                    Err("negative".into())
                } else {
                    Ok(())
                }
            },
            1,
        );
        let (listener, calls) = recorder();
        observable.register_listener(&listener);

        let error = observable.set(-1).unwrap_err();
        assert!(matches!(error, ObservableError::ValidationRejected(_)));
        assert_eq!(observable.get(), 1);
        assert!(observable.is_valid());
        assert!(calls.borrow().is_empty());

        observable.set(5).unwrap();
        assert_eq!(observable.get(), 5);
    }

    #[test]
    fn validator_sees_every_candidate() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let observable = SimpleObservable::with_validator(
            move |v: &Option<String>| {
                seen_clone.borrow_mut().push(v.clone());
                Ok(())
            },
            None,
        );

        observable.set(None).unwrap();
        observable.set(Some("Test".to_string())).unwrap();
        observable.set(Some("Test".to_string())).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![None, Some("Test".to_string()), Some("Test".to_string())]
        );
    }

    #[test]
    fn clone_shares_state() {
        let observable1 = SimpleObservable::new(0);
        let observable2 = observable1.clone();

        observable1.set(42).unwrap();
        assert_eq!(observable2.get(), 42);
        assert_eq!(observable1.id(), observable2.id());
    }

    #[test]
    fn bind_to_adopts_and_follows_upstream() {
        let upstream = SimpleObservable::new("Test");
        let downstream = SimpleObservable::new("");

        downstream.bind_to(&upstream).unwrap();
        assert_eq!(downstream.get(), "Test");
        assert!(downstream.is_bound());
        assert!(downstream.is_bound_to(&upstream));
        assert!(!downstream.is_bound_bidirectionally());
        assert!(!upstream.is_bound());

        upstream.set("Test2").unwrap();
        assert_eq!(downstream.get(), "Test2");
    }

    #[test]
    fn bound_observable_rejects_set() {
        let upstream = SimpleObservable::new(1);
        let downstream = SimpleObservable::new(0);
        downstream.bind_to(&upstream).unwrap();

        let error = downstream.set(5).unwrap_err();
        assert!(matches!(
            error,
            ObservableError::InvalidOperation(InvalidOperation::BoundToUpstream)
        ));
        assert_eq!(downstream.get(), 1);
    }

    #[test]
    fn binding_to_same_upstream_twice_is_a_no_op() {
        let upstream = SimpleObservable::new(1);
        let downstream = SimpleObservable::new(0);

        downstream.bind_to(&upstream).unwrap();
        downstream.bind_to(&upstream.clone()).unwrap();
        assert_eq!(upstream.listener_count(), 1);
    }

    #[test]
    fn binding_to_second_upstream_fails() {
        let first = SimpleObservable::new(1);
        let second = SimpleObservable::new(2);
        let downstream = SimpleObservable::new(0);

        downstream.bind_to(&first).unwrap();
        let error = downstream.bind_to(&second).unwrap_err();
        assert!(matches!(
            error,
            ObservableError::InvalidOperation(InvalidOperation::AlreadyBound)
        ));
        assert_eq!(downstream.get(), 1);
    }

    #[test]
    fn binding_to_self_is_rejected() {
        let observable = SimpleObservable::new(1);

        assert!(matches!(
            observable.bind_to(&observable).unwrap_err(),
            ObservableError::InvalidArgument(_)
        ));
        assert!(matches!(
            observable.bind_bidirectionally_to(&observable).unwrap_err(),
            ObservableError::InvalidArgument(_)
        ));
        assert!(!observable.is_bound());
    }

    #[test]
    fn unbind_keeps_last_value() {
        let upstream = SimpleObservable::new(1);
        let downstream = SimpleObservable::new(0);
        downstream.bind_to(&upstream).unwrap();

        downstream.unbind().unwrap();
        assert_eq!(downstream.get(), 1);
        assert!(!downstream.is_bound());
        assert_eq!(upstream.listener_count(), 0);

        upstream.set(2).unwrap();
        assert_eq!(downstream.get(), 1);

        downstream.set(3).unwrap();
        assert_eq!(upstream.get(), 2);
    }

    #[test]
    fn unbind_without_upstream_fails() {
        let observable = SimpleObservable::new(0);
        assert!(matches!(
            observable.unbind().unwrap_err(),
            ObservableError::InvalidOperation(InvalidOperation::NotBound)
        ));
    }

    #[test]
    fn unbind_keeps_bidirectional_bindings() {
        let a = SimpleObservable::new(0);
        let b = SimpleObservable::new(1);
        a.bind_bidirectionally_to(&b).unwrap();

        assert!(a.unbind().is_err());
        assert!(a.is_bound_bidirectionally_to(&b));
    }

    #[test]
    fn upstream_validation_failure_propagates_to_setter() {
        let upstream = SimpleObservable::new(1);
        let downstream = SimpleObservable::with_validator(
            |v: &i32| if *v > 10 { Err("too large".into()) } else { Ok(()) },
            0,
        );
        downstream.bind_to(&upstream).unwrap();

        let error = upstream.set(11).unwrap_err();
        assert!(matches!(error, ObservableError::ValidationRejected(_)));
        assert_eq!(upstream.get(), 11);
        assert_eq!(downstream.get(), 1);
        assert!(upstream.is_valid());
        assert!(downstream.is_valid());
    }

    #[test]
    fn bidirectional_binding_adopts_peer_value() {
        let a = SimpleObservable::new(None);
        let b = SimpleObservable::new(Some("Test"));

        a.bind_bidirectionally_to(&b).unwrap();
        assert_eq!(a.get(), Some("Test"));
        assert_eq!(b.get(), Some("Test"));
        assert!(a.is_bound_bidirectionally_to(&b));
        assert!(b.is_bound_bidirectionally_to(&a));
        assert!(a.is_bound() && b.is_bound());
    }

    #[test]
    fn bidirectional_binding_mirrors_both_ways() {
        let a = SimpleObservable::new(0);
        let b = SimpleObservable::new(0);
        a.bind_bidirectionally_to(&b).unwrap();

        a.set(1).unwrap();
        assert_eq!(b.get(), 1);

        b.set(2).unwrap();
        assert_eq!(a.get(), 2);
    }

    #[test]
    fn mirrored_update_notifies_each_listener_once() {
        let a = SimpleObservable::new(0);
        let b = SimpleObservable::new(0);
        a.bind_bidirectionally_to(&b).unwrap();

        let (listener_a, calls_a) = recorder();
        let (listener_b, calls_b) = recorder();
        a.register_listener(&listener_a);
        b.register_listener(&listener_b);

        a.set(7).unwrap();
        assert_eq!(*calls_a.borrow(), vec![(0, 7)]);
        assert_eq!(*calls_b.borrow(), vec![(0, 7)]);
    }

    #[test]
    fn bidirectional_binding_is_idempotent() {
        let a = SimpleObservable::new(0);
        let b = SimpleObservable::new(1);

        a.bind_bidirectionally_to(&b).unwrap();
        a.bind_bidirectionally_to(&b).unwrap();
        b.bind_bidirectionally_to(&a).unwrap();

        assert_eq!(a.listener_count(), 1);
        assert_eq!(b.listener_count(), 1);
    }

    #[test]
    fn bidirectional_binding_rejected_while_unidirectionally_bound() {
        let upstream = SimpleObservable::new(0);
        let bound = SimpleObservable::new(0);
        let free = SimpleObservable::new(0);
        bound.bind_to(&upstream).unwrap();

        assert!(bound.bind_bidirectionally_to(&free).is_err());
        assert!(free.bind_bidirectionally_to(&bound).is_err());
        assert!(!free.is_bound());
        assert_eq!(bound.listener_count(), 0);
    }

    #[test]
    fn bidirectional_validation_failure_leaves_no_binding() {
        let a = SimpleObservable::with_validator(
            |v: &i32| if *v < 0 { Err("negative".into()) } else { Ok(()) },
            1,
        );
        let b = SimpleObservable::new(-1);

        assert!(matches!(
            a.bind_bidirectionally_to(&b).unwrap_err(),
            ObservableError::ValidationRejected(_)
        ));
        assert!(!a.is_bound());
        assert!(!b.is_bound());
        assert_eq!(a.get(), 1);
    }

    #[test]
    fn unbind_bidirectional_removes_both_sides() {
        let a = SimpleObservable::new(0);
        let b = SimpleObservable::new(0);
        a.bind_bidirectionally_to(&b).unwrap();

        a.unbind_bidirectional(&b).unwrap();
        assert!(!a.is_bound_bidirectionally_to(&b));
        assert!(!b.is_bound_bidirectionally_to(&a));
        assert!(!a.is_bound());
        assert!(!b.is_bound());
        assert_eq!(a.listener_count(), 0);
        assert_eq!(b.listener_count(), 0);

        a.set(4).unwrap();
        assert_eq!(b.get(), 0);
    }

    #[test]
    fn unbind_bidirectional_from_stranger_fails() {
        let a = SimpleObservable::new(0);
        let b = SimpleObservable::new(0);

        assert!(matches!(
            a.unbind_bidirectional(&b).unwrap_err(),
            ObservableError::InvalidOperation(InvalidOperation::NotBoundTo(id)) if id == b.id()
        ));
    }

    #[test]
    fn unbind_all_clears_every_peer() {
        let hub = SimpleObservable::new(0);
        let spokes: Vec<_> = (1..=3).map(SimpleObservable::new).collect();
        for spoke in &spokes {
            spoke.bind_bidirectionally_to(&hub).unwrap();
        }

        hub.unbind_all().unwrap();
        assert!(!hub.is_bound());
        for spoke in &spokes {
            assert!(!spoke.is_bound());
        }
    }

    #[test]
    fn unbind_all_clears_upstream() {
        let upstream = SimpleObservable::new(0);
        let downstream = SimpleObservable::new(0);
        downstream.bind_to(&upstream).unwrap();

        downstream.unbind_all().unwrap();
        assert!(!downstream.is_bound());
    }

    #[test]
    fn unbind_all_without_bindings_fails() {
        let observable = SimpleObservable::new(0);
        assert!(matches!(
            observable.unbind_all().unwrap_err(),
            ObservableError::InvalidOperation(InvalidOperation::NoBindings)
        ));
    }

    #[test]
    fn dropped_peer_is_forgotten() {
        let a = SimpleObservable::new(0);
        let b = SimpleObservable::new(0);
        a.bind_bidirectionally_to(&b).unwrap();

        drop(b);
        assert!(!a.is_bound());
        assert!(a.unbind_all().is_err());

        let upstream = SimpleObservable::new(3);
        a.bind_to(&upstream).unwrap();
        assert_eq!(a.get(), 3);
    }

    #[test]
    fn dropped_downstream_leaves_upstream_clean() {
        let upstream = SimpleObservable::new(0);
        let downstream = SimpleObservable::new(0);
        downstream.bind_to(&upstream).unwrap();
        assert_eq!(upstream.listener_count(), 1);

        drop(downstream);
        assert_eq!(upstream.listener_count(), 0);
        upstream.set(1).unwrap();
    }

    #[test]
    fn listener_may_set_its_own_observable() {
        let observable = SimpleObservable::new(0);
        let observable_clone = observable.clone();
        let clamp = listener(move |_, _, new: &i32| {
            if *new > 10 {
                observable_clone.set(10)?;
            }
            Ok(())
        });
        observable.register_listener(&clamp);

        observable.set(50).unwrap();
        assert_eq!(observable.get(), 10);
        assert!(observable.is_valid());
    }

    #[test]
    fn nested_set_keeps_outer_update_in_flight() {
        let observable = SimpleObservable::new(0);
        let valid_after_nested = Rc::new(Cell::new(None));

        let observable_clone = observable.clone();
        let valid_clone = Rc::clone(&valid_after_nested);
        let clamp = listener(move |_, _, new: &i32| {
            if *new > 10 {
                observable_clone.set(10)?;
                valid_clone.set(Some(observable_clone.is_valid()));
            }
            Ok(())
        });
        observable.register_listener(&clamp);

        observable.set(50).unwrap();
        assert_eq!(valid_after_nested.get(), Some(false));
        assert_eq!(observable.update_state(), UpdateState::Idle);
        assert!(observable.is_valid());
    }
}
