//! Binding Implementation
//!
//! A Binding is a derived observable whose value is computed from a fixed set
//! of dependencies.
//!
//! # How Bindings Work
//!
//! 1. On construction the binding runs its computation once and stores the
//!    result, then subscribes to every dependency.
//!
//! 2. When any dependency changes, the binding re-runs the computation and
//!    stores the result. Listeners of the binding are notified only if the
//!    result differs from the previous one.
//!
//! 3. [`Binding::invalidate`] forces the same re-evaluation by hand, for
//!    computations that also read state outside of observables.
//!
//! Re-evaluation is immediate and synchronous. There is no batching and no
//! ordering beyond direct fan-out: a binding that depends on two observables
//! which change in the same logical step recomputes twice.
//!
//! # Ownership
//!
//! The binding owns the listeners it registers on its dependencies. Dropping
//! the last handle of a binding silently ends its subscriptions.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::simple::SimpleObservable;
use super::traits::{listener, ChangeListener, Observable, ReadOnlyObservable};
use super::ObservableId;
use crate::error::Result;

/// Callback a dependency invokes after its value changed.
pub type InvalidationFn = dyn Fn() -> Result<()>;

/// Keeps a dependency subscription alive. Dropping it ends the subscription.
pub struct Subscription {
    _listener: Box<dyn Any>,
}

impl Subscription {
    /// Wrap the handle that must stay alive for the subscription to deliver.
    pub fn new<T: 'static>(listener: T) -> Self {
        Self {
            _listener: Box::new(listener),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// A type-erased observable a binding can depend on.
///
/// Implemented for every cloneable [`ReadOnlyObservable`], so one binding may
/// depend on observables of different value types.
pub trait Dependency {
    /// Id of the observed observable.
    fn dependency_id(&self) -> ObservableId;

    /// Invoke `on_change` whenever the observed value changes.
    fn subscribe(&self, on_change: Rc<InvalidationFn>) -> Subscription;

    /// Box this dependency.
    fn boxed(self) -> Box<dyn Dependency>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl<O> Dependency for O
where
    O: ReadOnlyObservable + Clone + 'static,
{
    fn dependency_id(&self) -> ObservableId {
        self.id()
    }

    fn subscribe(&self, on_change: Rc<InvalidationFn>) -> Subscription {
        let listener: ChangeListener<O::Value> = listener(move |_, _, _: &O::Value| on_change());
        self.register_listener(&listener);
        Subscription::new(listener)
    }
}

impl fmt::Debug for dyn Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency({})", self.dependency_id())
    }
}

struct Inner<V>
where
    V: Clone + PartialEq + 'static,
{
    observable: SimpleObservable<V>,
    compute: Box<dyn Fn() -> V>,
    dependencies: Vec<Box<dyn Dependency>>,
    _subscriptions: Vec<Subscription>,
}

impl<V> Inner<V>
where
    V: Clone + PartialEq + 'static,
{
    fn invalidate(&self) -> Result<()> {
        trace!(id = %self.observable.id(), "re-evaluating binding");
        let value = (self.compute)();
        self.observable.set(value)
    }
}

/// A derived, read-only observable.
///
/// # Example
///
/// ```rust
/// use observable_core::prelude::*;
///
/// let width = SimpleObservable::new(3);
/// let height = SimpleObservable::new(4);
///
/// let area = {
///     let (w, h) = (width.clone(), height.clone());
///     Binding::new(move || w.get() * h.get(), vec![width.clone().boxed(), height.clone().boxed()])
/// };
/// assert_eq!(area.get(), 12);
///
/// width.set(5)?;
/// assert_eq!(area.get(), 20);
/// # Ok::<(), observable_core::ObservableError>(())
/// ```
pub struct Binding<V>
where
    V: Clone + PartialEq + 'static,
{
    inner: Rc<Inner<V>>,
}

impl<V> Binding<V>
where
    V: Clone + PartialEq + 'static,
{
    /// Create a binding from a computation and the observables it reads.
    ///
    /// Dependencies listed more than once are subscribed to once.
    pub fn new<F>(compute: F, dependencies: Vec<Box<dyn Dependency>>) -> Self
    where
        F: Fn() -> V + 'static,
    {
        let mut unique: Vec<Box<dyn Dependency>> = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            if !unique
                .iter()
                .any(|known| known.dependency_id() == dependency.dependency_id())
            {
                unique.push(dependency);
            }
        }

        let observable = SimpleObservable::new(compute());

        let inner = Rc::new_cyclic(|weak: &Weak<Inner<V>>| {
            let owner = weak.clone();
            let on_change: Rc<InvalidationFn> = Rc::new(move || match owner.upgrade() {
                Some(inner) => inner.invalidate(),
                None => Ok(()),
            });

            let subscriptions = unique
                .iter()
                .map(|dependency| dependency.subscribe(Rc::clone(&on_change)))
                .collect();

            Inner {
                observable,
                compute: Box::new(compute),
                dependencies: unique,
                _subscriptions: subscriptions,
            }
        });

        debug!(
            id = %inner.observable.id(),
            dependencies = inner.dependencies.len(),
            "created binding"
        );

        Self { inner }
    }

    /// Derive a value from a single observable.
    pub fn map<S, F>(f: F, source: &S) -> Self
    where
        S: ReadOnlyObservable + Clone + 'static,
        F: Fn(S::Value) -> V + 'static,
    {
        let input = source.clone();
        Self::new(move || f(input.get()), vec![source.clone().boxed()])
    }

    /// Pick the value of `first` if `predicate(first, second)` holds, the
    /// value of `second` otherwise.
    pub fn ternary<A, B, P>(predicate: P, first: &A, second: &B) -> Self
    where
        A: ReadOnlyObservable<Value = V> + Clone + 'static,
        B: ReadOnlyObservable<Value = V> + Clone + 'static,
        P: Fn(&V, &V) -> bool + 'static,
    {
        let (a, b) = (first.clone(), second.clone());
        Self::new(
            move || {
                let (value1, value2) = (a.get(), b.get());
                if predicate(&value1, &value2) {
                    value1
                } else {
                    value2
                }
            },
            vec![first.clone().boxed(), second.clone().boxed()],
        )
    }

    /// Pick between two fixed values based on a condition.
    ///
    /// The binding has no dependencies; call [`invalidate`](Self::invalidate)
    /// when the condition may have changed.
    pub fn select<C>(condition: C, value1: V, value2: V) -> Self
    where
        C: Fn() -> bool + 'static,
    {
        Self::new(
            move || {
                if condition() {
                    value1.clone()
                } else {
                    value2.clone()
                }
            },
            Vec::new(),
        )
    }

    /// A binding that always holds `value`.
    pub fn constant(value: V) -> Self {
        Self::new(move || value.clone(), Vec::new())
    }

    /// Re-run the computation and store its result.
    pub fn invalidate(&self) -> Result<()> {
        self.inner.invalidate()
    }

    /// The observables this binding depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = &(dyn Dependency + 'static)> + '_ {
        self.inner.dependencies.iter().map(|dependency| &**dependency)
    }

    /// Whether `observable` is one of this binding's dependencies.
    pub fn depends_on<O>(&self, observable: &O) -> bool
    where
        O: ReadOnlyObservable + ?Sized,
    {
        self.dependencies()
            .any(|dependency| dependency.dependency_id() == observable.id())
    }

    /// Whether no re-evaluation of this binding is currently in flight.
    pub fn is_valid(&self) -> bool {
        self.inner.observable.is_valid()
    }
}

/// Logic combinators.
impl Binding<bool> {
    /// Whether both observables hold equal values.
    pub fn equals<A, B>(first: &A, second: &B) -> Self
    where
        A: ReadOnlyObservable + Clone + 'static,
        B: ReadOnlyObservable<Value = A::Value> + Clone + 'static,
    {
        Self::compare(first, second, |a, b| a == b)
    }

    /// Whether the observables hold different values.
    pub fn not_equals<A, B>(first: &A, second: &B) -> Self
    where
        A: ReadOnlyObservable + Clone + 'static,
        B: ReadOnlyObservable<Value = A::Value> + Clone + 'static,
    {
        Self::compare(first, second, |a, b| a != b)
    }

    /// Whether an optional value is absent.
    pub fn is_none<O, T>(observable: &O) -> Self
    where
        O: ReadOnlyObservable<Value = Option<T>> + Clone + 'static,
        T: 'static,
    {
        Self::map(|value: Option<T>| value.is_none(), observable)
    }

    /// Whether an optional value is present.
    pub fn is_some<O, T>(observable: &O) -> Self
    where
        O: ReadOnlyObservable<Value = Option<T>> + Clone + 'static,
        T: 'static,
    {
        Self::map(|value: Option<T>| value.is_some(), observable)
    }

    /// Logical conjunction.
    pub fn and<A, B>(first: &A, second: &B) -> Self
    where
        A: ReadOnlyObservable<Value = bool> + Clone + 'static,
        B: ReadOnlyObservable<Value = bool> + Clone + 'static,
    {
        Self::combine(first, second, |a, b| a && b)
    }

    /// Logical disjunction.
    pub fn or<A, B>(first: &A, second: &B) -> Self
    where
        A: ReadOnlyObservable<Value = bool> + Clone + 'static,
        B: ReadOnlyObservable<Value = bool> + Clone + 'static,
    {
        Self::combine(first, second, |a, b| a || b)
    }

    /// Exclusive disjunction.
    pub fn xor<A, B>(first: &A, second: &B) -> Self
    where
        A: ReadOnlyObservable<Value = bool> + Clone + 'static,
        B: ReadOnlyObservable<Value = bool> + Clone + 'static,
    {
        Self::combine(first, second, |a, b| a != b)
    }

    /// Logical negation.
    pub fn negate<A>(observable: &A) -> Self
    where
        A: ReadOnlyObservable<Value = bool> + Clone + 'static,
    {
        Self::map(|value: bool| !value, observable)
    }

    fn compare<A, B, F>(first: &A, second: &B, predicate: F) -> Self
    where
        A: ReadOnlyObservable + Clone + 'static,
        B: ReadOnlyObservable<Value = A::Value> + Clone + 'static,
        F: Fn(&A::Value, &A::Value) -> bool + 'static,
    {
        let (a, b) = (first.clone(), second.clone());
        Self::new(
            move || predicate(&a.get(), &b.get()),
            vec![first.clone().boxed(), second.clone().boxed()],
        )
    }

    fn combine<A, B, F>(first: &A, second: &B, operator: F) -> Self
    where
        A: ReadOnlyObservable<Value = bool> + Clone + 'static,
        B: ReadOnlyObservable<Value = bool> + Clone + 'static,
        F: Fn(bool, bool) -> bool + 'static,
    {
        let (a, b) = (first.clone(), second.clone());
        Self::new(
            move || operator(a.get(), b.get()),
            vec![first.clone().boxed(), second.clone().boxed()],
        )
    }
}

impl<V> ReadOnlyObservable for Binding<V>
where
    V: Clone + PartialEq + 'static,
{
    type Value = V;

    fn id(&self) -> ObservableId {
        self.inner.observable.id()
    }

    fn get(&self) -> V {
        self.inner.observable.get()
    }

    fn register_listener(&self, listener: &ChangeListener<V>) {
        self.inner.observable.register_listener(listener);
    }

    fn remove_listener(&self, listener: &ChangeListener<V>) {
        self.inner.observable.remove_listener(listener);
    }
}

impl<V> Clone for Binding<V>
where
    V: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Binding<V>
where
    V: Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id())
            .field("value", &self.get())
            .field("dependencies", &self.inner.dependencies)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
