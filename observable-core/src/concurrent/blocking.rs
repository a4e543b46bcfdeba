//! Blocking Observable
//!
//! A thread-safe observable. Handles are `Send + Sync` and can be cloned into
//! as many threads as needed; all clones share one value.
//!
//! # How Locking Works
//!
//! Every mutation, binding and unbinding operation holds the observable's
//! reentrant update lock from start to finish, listener callbacks and the
//! mirror call of a bidirectional binding included. Reads (`get` and the
//! `is_bound*` queries) take the same lock, so a reader on another thread
//! waits until an update in flight has finished and never sees a value that
//! is still propagating or a binding that is only half installed. The
//! updating thread itself may read and re-enter the observable.
//!
//! The value and the binding state additionally sit behind a read/write lock
//! that is held only while state is swapped.
//!
//! The update lock doubles as the "update in flight" marker: [`is_valid`]
//! reports whether any thread holds it for an update (readers do not count),
//! and binding callbacks that arrive during an update are dropped, which is
//! what ends propagation around a ring of bidirectional bindings.
//!
//! A `set` on an observable bound to an upstream fails before it takes the
//! update lock, so a rejected write never hides an upstream change.
//!
//! # Hazards
//!
//! - A validator or listener that waits for another thread which in turn
//!   reads or updates the same observable deadlocks.
//! - Two threads that start binding operations on the same pair of
//!   observables from opposite ends may deadlock.
//! - Two threads updating different dependencies of one `SharedBinding` may
//!   deadlock, since each recomputation reads the dependency the other thread
//!   is updating.
//! - An update that reaches a bidirectional peer while another thread is
//!   updating that peer is dropped by the peer.
//! - A `set` racing with `bind_to` on the same observable may still pass the
//!   upstream check first; it then waits for the binding and fails.
//!
//! [`is_valid`]: SharedObservable::is_valid

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::config::{BlockingObservableBuilder, Fairness};
use super::lock::{StateLock, UpdateLock};
use super::registry::WeakCopyOnWriteSet;
use super::traits::{
    shared_listener, SharedChangeListener, SharedListenerFn, SharedObservable,
    SharedReadOnlyObservable, SharedValidator,
};
use crate::error::{BoxError, InvalidOperation, ObservableError, Result};
use crate::observable::ObservableId;

enum BindingState<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    Unbound,
    Unidirectional(Box<dyn SharedReadOnlyObservable<Value = V>>),
    Bidirectional(IndexMap<ObservableId, Weak<Inner<V>>>),
}

impl<V> BindingState<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Forget dropped peers. An empty peer set becomes `Unbound`.
    fn prune(&mut self) {
        if let Self::Bidirectional(peers) = self {
            peers.retain(|_, peer| peer.strong_count() > 0);
            if peers.is_empty() {
                *self = Self::Unbound;
            }
        }
    }

    fn insert_peer(&mut self, id: ObservableId, peer: Weak<Inner<V>>) {
        match self {
            Self::Bidirectional(peers) => {
                peers.insert(id, peer);
            }
            _ => *self = Self::Bidirectional(IndexMap::from([(id, peer)])),
        }
    }

    fn remove_peer(&mut self, id: ObservableId) {
        if let Self::Bidirectional(peers) = self {
            peers.shift_remove(&id);
            if peers.is_empty() {
                *self = Self::Unbound;
            }
        }
    }

    fn has_peer(&self, id: ObservableId) -> bool {
        matches!(self, Self::Bidirectional(peers) if peers.contains_key(&id))
    }

    fn has_live_peer(&self) -> bool {
        matches!(self, Self::Bidirectional(peers) if peers.values().any(|peer| peer.strong_count() > 0))
    }

    fn live_peers(&self) -> Vec<Arc<Inner<V>>> {
        match self {
            Self::Bidirectional(peers) => peers.values().filter_map(Weak::upgrade).collect(),
            _ => Vec::new(),
        }
    }
}

struct State<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    value: V,
    binding: BindingState<V>,
}

impl<V> State<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Store `value` and return `(old, new)`.
    fn swap_value(&mut self, value: V) -> (V, V) {
        let new_value = value.clone();
        let old_value = mem::replace(&mut self.value, value);
        (old_value, new_value)
    }
}

struct Inner<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    id: ObservableId,
    state: StateLock<State<V>>,
    update_lock: UpdateLock,
    validator: Option<Box<SharedValidator<V>>>,
    listeners: WeakCopyOnWriteSet<SharedListenerFn<V>>,
    binding_listener: SharedChangeListener<V>,
    fairness: Fairness,
}

impl<V> Inner<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn on_binding_change(&self, value: &V) -> Result<()> {
        if self.update_lock.is_updating() {
            trace!(id = %self.id, "ignoring binding callback during update");
            return Ok(());
        }

        self.set_internal(value.clone())
    }

    fn set_internal(&self, value: V) -> Result<()> {
        let _update = self.update_lock.lock();

        self.validate(&value)?;
        let (old_value, new_value) = self.state.write(|state| state.swap_value(value));
        self.publish_if_changed(&old_value, &new_value)
    }

    fn validate(&self, value: &V) -> Result<()> {
        match &self.validator {
            Some(validator) => validator(value).map_err(ObservableError::ValidationRejected),
            None => Ok(()),
        }
    }

    /// Notify listeners. Callers hold the update lock.
    fn publish_if_changed(&self, old_value: &V, new_value: &V) -> Result<()> {
        if old_value == new_value {
            return Ok(());
        }

        let listeners = self.listeners.snapshot();
        trace!(id = %self.id, listeners = listeners.len(), "publishing change");

        for listener in listeners {
            listener(self.id, old_value, new_value)?;
        }

        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.has_upstream() {
            return Err(InvalidOperation::BoundToUpstream.into());
        }

        Ok(())
    }

    fn has_upstream(&self) -> bool {
        self.state
            .read(|state| matches!(state.binding, BindingState::Unidirectional(_)))
    }
}

/// A thread-safe observable value.
///
/// # Example
///
/// ```rust
/// use std::thread;
/// use observable_core::prelude::*;
///
/// let counter = BlockingObservable::new(0);
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let counter = counter.clone();
///         thread::spawn(move || counter.update(|v| v + 1))
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap()?;
/// }
/// assert_eq!(counter.get(), 4);
/// # Ok::<(), observable_core::ObservableError>(())
/// ```
pub struct BlockingObservable<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<Inner<V>>,
}

impl<V> BlockingObservable<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an observable with unfair locking and no validator.
    pub fn new(value: V) -> Self {
        Self::from_parts(value, None, Fairness::default())
    }

    /// Create an observable whose values must pass `validator`.
    pub fn with_validator<F>(validator: F, value: V) -> Self
    where
        F: Fn(&V) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::builder(value).validator(validator).build()
    }

    /// Start configuring an observable.
    pub fn builder(value: V) -> BlockingObservableBuilder<V> {
        BlockingObservableBuilder::new(value)
    }

    pub(crate) fn from_parts(
        value: V,
        validator: Option<Box<SharedValidator<V>>>,
        fairness: Fairness,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner<V>>| {
            let owner = weak.clone();
            let binding_listener =
                shared_listener(move |_source, _old, new: &V| match owner.upgrade() {
                    Some(inner) => inner.on_binding_change(new),
                    None => Ok(()),
                });

            Inner {
                id: ObservableId::new(),
                state: StateLock::new(
                    State {
                        value,
                        binding: BindingState::Unbound,
                    },
                    fairness,
                ),
                update_lock: UpdateLock::new(fairness),
                validator,
                listeners: WeakCopyOnWriteSet::new(),
                binding_listener,
                fairness,
            }
        });

        Self { inner }
    }

    fn from_inner(inner: Arc<Inner<V>>) -> Self {
        Self { inner }
    }

    /// Replace the value with one derived from the current value.
    ///
    /// Read and write happen under the update lock, so concurrent calls do
    /// not lose each other's updates.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&V) -> V,
    {
        self.inner.check_writable()?;

        let _update = self.inner.update_lock.lock();
        let current = self.get();
        self.set(f(&current))
    }

    /// Compute and store a value while holding the update lock.
    pub(crate) fn set_computed<F>(&self, compute: F) -> Result<()>
    where
        F: FnOnce() -> V,
    {
        let _update = self.inner.update_lock.lock();
        self.set(compute())
    }

    /// The lock hand-over policy this observable was built with.
    pub fn fairness(&self) -> Fairness {
        self.inner.fairness
    }

    /// Number of live listeners, including binding listeners of other observables.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<V> SharedReadOnlyObservable for BlockingObservable<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = V;

    fn id(&self) -> ObservableId {
        self.inner.id
    }

    fn get(&self) -> V {
        let _read = self.inner.update_lock.lock_read();
        self.inner.state.read(|state| state.value.clone())
    }

    fn register_listener(&self, listener: &SharedChangeListener<V>) {
        self.inner.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &SharedChangeListener<V>) {
        self.inner.listeners.remove(listener);
    }
}

impl<V> SharedObservable for BlockingObservable<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn set(&self, value: V) -> Result<()> {
        self.inner.check_writable()?;

        let _update = self.inner.update_lock.lock();

        // A binding may have been installed while this thread waited
        self.inner.check_writable()?;
        self.inner.set_internal(value)
    }

    fn is_valid(&self) -> bool {
        !self.inner.update_lock.is_updating()
    }

    fn bind_to<U>(&self, upstream: &U) -> Result<()>
    where
        U: SharedReadOnlyObservable<Value = V> + Clone + 'static,
    {
        if upstream.id() == self.id() {
            return Err(ObservableError::InvalidArgument(
                "cannot bind an observable to itself",
            ));
        }

        let _update = self.inner.update_lock.lock();

        let current = self.inner.state.write(|state| {
            state.binding.prune();
            match &state.binding {
                BindingState::Unbound => None,
                BindingState::Unidirectional(current) => Some(current.id() == upstream.id()),
                BindingState::Bidirectional(_) => Some(false),
            }
        });

        match current {
            Some(true) => return Ok(()),
            Some(false) => return Err(InvalidOperation::AlreadyBound.into()),
            None => {}
        }

        upstream.register_listener(&self.inner.binding_listener);

        let value = upstream.get();
        if let Err(error) = self.inner.validate(&value) {
            upstream.remove_listener(&self.inner.binding_listener);
            return Err(error);
        }

        let installed: Box<dyn SharedReadOnlyObservable<Value = V>> = Box::new(upstream.clone());
        let (old_value, new_value) = self.inner.state.write(move |state| {
            state.binding = BindingState::Unidirectional(installed);
            state.swap_value(value)
        });
        debug!(id = %self.id(), upstream = %upstream.id(), "bound to upstream");

        self.inner.publish_if_changed(&old_value, &new_value)
    }

    fn bind_bidirectionally_to(&self, peer: &Self) -> Result<()> {
        if peer.id() == self.id() {
            return Err(ObservableError::InvalidArgument(
                "cannot bind an observable to itself",
            ));
        }

        let _update = self.inner.update_lock.lock();

        let conflict: Option<Result<()>> = self.inner.state.write(|state| {
            state.binding.prune();
            match &state.binding {
                BindingState::Unidirectional(_) => Some(Err(InvalidOperation::AlreadyBound.into())),
                binding if binding.has_peer(peer.id()) => Some(Ok(())),
                _ => None,
            }
        });

        if let Some(result) = conflict {
            return result;
        }

        if peer.inner.has_upstream() {
            return Err(InvalidOperation::AlreadyBound.into());
        }

        let adopted = if peer.is_bound_bidirectionally_to(self) {
            None
        } else {
            let value = peer.get();
            self.inner.validate(&value)?;
            Some(value)
        };

        peer.register_listener(&self.inner.binding_listener);

        let (peer_id, entry) = (peer.id(), Arc::downgrade(&peer.inner));
        let change = self.inner.state.write(move |state| {
            state.binding.insert_peer(peer_id, entry);
            adopted.map(|value| state.swap_value(value))
        });
        debug!(id = %self.id(), peer = %peer_id, "bound bidirectionally");

        if let Some((old_value, new_value)) = change {
            self.inner.publish_if_changed(&old_value, &new_value)?;
        }

        peer.bind_bidirectionally_to(self)
    }

    fn is_bound(&self) -> bool {
        let _read = self.inner.update_lock.lock_read();
        self.inner.state.read(|state| match &state.binding {
            BindingState::Unbound => false,
            BindingState::Unidirectional(_) => true,
            binding => binding.has_live_peer(),
        })
    }

    fn is_bound_to<U>(&self, upstream: &U) -> bool
    where
        U: SharedReadOnlyObservable + ?Sized,
    {
        let _read = self.inner.update_lock.lock_read();
        self.inner.state.read(|state| match &state.binding {
            BindingState::Unidirectional(current) => current.id() == upstream.id(),
            _ => false,
        })
    }

    fn is_bound_bidirectionally(&self) -> bool {
        let _read = self.inner.update_lock.lock_read();
        self.inner.state.read(|state| state.binding.has_live_peer())
    }

    fn is_bound_bidirectionally_to(&self, peer: &Self) -> bool {
        let _read = self.inner.update_lock.lock_read();
        self.inner.state.read(|state| state.binding.has_peer(peer.id()))
    }

    fn unbind(&self) -> Result<()> {
        let _update = self.inner.update_lock.lock();

        let upstream = self.inner.state.write(|state| {
            match mem::replace(&mut state.binding, BindingState::Unbound) {
                BindingState::Unidirectional(upstream) => Some(upstream),
                other => {
                    state.binding = other;
                    None
                }
            }
        });

        let upstream = upstream.ok_or(InvalidOperation::NotBound)?;
        upstream.remove_listener(&self.inner.binding_listener);
        debug!(id = %self.id(), upstream = %upstream.id(), "unbound from upstream");

        Ok(())
    }

    fn unbind_all(&self) -> Result<()> {
        let _update = self.inner.update_lock.lock();

        if self.inner.has_upstream() {
            return self.unbind();
        }

        let peers = self.inner.state.write(|state| {
            state.binding.prune();
            state.binding.live_peers()
        });

        if peers.is_empty() {
            return Err(InvalidOperation::NoBindings.into());
        }

        for peer in peers {
            self.unbind_bidirectional(&Self::from_inner(peer))?;
        }

        Ok(())
    }

    fn unbind_bidirectional(&self, peer: &Self) -> Result<()> {
        let _update = self.inner.update_lock.lock();

        if !self.is_bound_bidirectionally_to(peer) {
            return Err(InvalidOperation::NotBoundTo(peer.id()).into());
        }

        peer.remove_listener(&self.inner.binding_listener);
        self.inner
            .state
            .write(|state| state.binding.remove_peer(peer.id()));
        debug!(id = %self.id(), peer = %peer.id(), "removed bidirectional binding");

        if peer.is_bound_bidirectionally_to(self) {
            peer.unbind_bidirectional(self)?;
        }

        Ok(())
    }
}

impl<V> Clone for BlockingObservable<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for BlockingObservable<V>
where
    V: Clone + PartialEq + Send + Sync + Default + 'static,
{
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V> fmt::Debug for BlockingObservable<V>
where
    V: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingObservable")
            .field("id", &self.inner.id)
            .field("value", &self.get())
            .field("fairness", &self.inner.fairness)
            .field("valid", &self.is_valid())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::mpsc;
    use std::thread;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn blocking_observable_is_send_and_sync() {
        assert_send_sync::<BlockingObservable<String>>();
        assert_send_sync::<BlockingObservable<Option<Vec<u8>>>>();
    }

    #[test]
    fn get_and_set() {
        let observable = BlockingObservable::new(0);
        observable.set(42).unwrap();
        assert_eq!(observable.get(), 42);
    }

    #[test]
    fn listeners_are_equality_gated() {
        let observable = BlockingObservable::new(None::<i32>);
        let call_count = Arc::new(AtomicI32::new(0));

        let call_count_clone = Arc::clone(&call_count);
        let listener = shared_listener(move |_, _, _: &Option<i32>| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        observable.register_listener(&listener);

        observable.set(None).unwrap();
        observable.set(Some(1)).unwrap();
        observable.set(Some(1)).unwrap();
        observable.set(None).unwrap();

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_can_read_observable() {
        let observable = BlockingObservable::new(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let observable_clone = observable.clone();
        let seen_clone = Arc::clone(&seen);
        let listener = shared_listener(move |_, _, _: &i32| {
            seen_clone.store(observable_clone.get(), Ordering::SeqCst);
            Ok(())
        });
        observable.register_listener(&listener);

        observable.set(5).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn validator_rejection_releases_lock() {
        let observable = BlockingObservable::builder(1)
            .validator(|v: &i32| if *v < 0 { Err("negative".into()) } else { Ok(()) })
            .fairness(Fairness::Fair)
            .build();

        assert!(matches!(
            observable.set(-1).unwrap_err(),
            ObservableError::ValidationRejected(_)
        ));
        assert_eq!(observable.get(), 1);
        assert!(observable.is_valid());
        assert_eq!(observable.fairness(), Fairness::Fair);
    }

    #[test]
    fn is_valid_is_false_while_another_thread_updates() {
        let observable = BlockingObservable::new(0);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = parking_lot::Mutex::new(release_rx);

        let listener = shared_listener(move |_, _, _: &i32| {
            entered_tx.send(()).unwrap();
            release_rx.lock().recv().unwrap();
            Ok(())
        });
        observable.register_listener(&listener);

        let observable_clone = observable.clone();
        let handle = thread::spawn(move || observable_clone.set(1));

        entered_rx.recv().unwrap();
        assert!(!observable.is_valid());

        release_tx.send(()).unwrap();
        handle.join().unwrap().unwrap();
        assert!(observable.is_valid());
        assert_eq!(observable.get(), 1);
    }

    #[test]
    fn set_on_bound_observable_fails_without_taking_update_lock() {
        let upstream = BlockingObservable::new(0);
        let downstream = BlockingObservable::new(0);
        downstream.bind_to(&upstream).unwrap();

        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let holder = downstream.clone();
        let handle = thread::spawn(move || {
            let _update = holder.inner.update_lock.lock();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        locked_rx.recv().unwrap();

        // Neither call waits for the update lock another thread holds
        assert!(matches!(
            downstream.set(1).unwrap_err(),
            ObservableError::InvalidOperation(InvalidOperation::BoundToUpstream)
        ));
        assert!(matches!(
            downstream.update(|v| v + 1).unwrap_err(),
            ObservableError::InvalidOperation(InvalidOperation::BoundToUpstream)
        ));

        release_tx.send(()).unwrap();
        handle.join().unwrap();

        upstream.set(2).unwrap();
        assert_eq!(downstream.get(), 2);
    }

    #[test]
    fn bind_to_follows_upstream() {
        let upstream = BlockingObservable::new("a".to_string());
        let downstream = BlockingObservable::new(String::new());

        downstream.bind_to(&upstream).unwrap();
        assert_eq!(downstream.get(), "a");
        assert!(downstream.is_bound_to(&upstream));

        upstream.set("b".to_string()).unwrap();
        assert_eq!(downstream.get(), "b");

        assert!(matches!(
            downstream.set("c".to_string()).unwrap_err(),
            ObservableError::InvalidOperation(InvalidOperation::BoundToUpstream)
        ));

        downstream.unbind().unwrap();
        upstream.set("d".to_string()).unwrap();
        assert_eq!(downstream.get(), "b");
    }

    #[test]
    fn bind_to_rejected_by_validator_leaves_no_listener() {
        let upstream = BlockingObservable::new(100);
        let downstream = BlockingObservable::with_validator(
            |v: &i32| if *v > 10 { Err("too large".into()) } else { Ok(()) },
            0,
        );

        assert!(downstream.bind_to(&upstream).is_err());
        assert!(!downstream.is_bound());
        assert_eq!(upstream.listener_count(), 0);
    }

    #[test]
    fn bidirectional_ring_settles() {
        let a = BlockingObservable::new(0);
        let b = BlockingObservable::new(0);
        let c = BlockingObservable::new(0);

        a.bind_bidirectionally_to(&b).unwrap();
        b.bind_bidirectionally_to(&c).unwrap();
        c.bind_bidirectionally_to(&a).unwrap();

        a.set(1).unwrap();
        assert_eq!((a.get(), b.get(), c.get()), (1, 1, 1));

        c.set(2).unwrap();
        assert_eq!((a.get(), b.get(), c.get()), (2, 2, 2));
        assert!(a.is_valid() && b.is_valid() && c.is_valid());
    }

    #[test]
    fn unbind_all_tears_down_mirrors() {
        let a = BlockingObservable::new(0);
        let b = BlockingObservable::new(0);
        a.bind_bidirectionally_to(&b).unwrap();

        a.unbind_all().unwrap();
        assert!(!a.is_bound());
        assert!(!b.is_bound_bidirectionally());

        assert!(matches!(
            a.unbind_all().unwrap_err(),
            ObservableError::InvalidOperation(InvalidOperation::NoBindings)
        ));
    }

    #[test]
    fn update_is_atomic_across_threads() {
        let counter = BlockingObservable::new(0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        counter.update(|v| v + 1).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.get(), 800);
    }
}
