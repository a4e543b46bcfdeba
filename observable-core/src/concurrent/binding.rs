//! Thread-safe bindings.
//!
//! [`SharedBinding`] is the lock-based counterpart of
//! [`Binding`](crate::observable::Binding). Re-evaluation runs the
//! computation and stores the result under the binding's update lock, so two
//! threads changing different dependencies at the same time cannot overwrite
//! a newer result with an older one.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use super::blocking::BlockingObservable;
use super::traits::{shared_listener, SharedChangeListener, SharedObservable, SharedReadOnlyObservable};
use crate::error::Result;
use crate::observable::ObservableId;

/// Callback a shared dependency invokes after its value changed.
pub type SharedInvalidationFn = dyn Fn() -> Result<()> + Send + Sync;

/// Keeps a shared dependency subscription alive.
pub struct SharedSubscription {
    _listener: Box<dyn Any + Send + Sync>,
}

impl SharedSubscription {
    /// Wrap the handle that must stay alive for the subscription to deliver.
    pub fn new<T: Send + Sync + 'static>(listener: T) -> Self {
        Self {
            _listener: Box::new(listener),
        }
    }
}

impl fmt::Debug for SharedSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSubscription").finish_non_exhaustive()
    }
}

/// A type-erased thread-safe observable a binding can depend on.
pub trait SharedDependency: Send + Sync {
    /// Id of the observed observable.
    fn dependency_id(&self) -> ObservableId;

    /// Invoke `on_change` whenever the observed value changes.
    fn subscribe(&self, on_change: Arc<SharedInvalidationFn>) -> SharedSubscription;

    /// Box this dependency.
    fn boxed(self) -> Box<dyn SharedDependency>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl<O> SharedDependency for O
where
    O: SharedReadOnlyObservable + Clone + 'static,
{
    fn dependency_id(&self) -> ObservableId {
        self.id()
    }

    fn subscribe(&self, on_change: Arc<SharedInvalidationFn>) -> SharedSubscription {
        let listener: SharedChangeListener<O::Value> =
            shared_listener(move |_, _, _: &O::Value| on_change());
        self.register_listener(&listener);
        SharedSubscription::new(listener)
    }
}

impl fmt::Debug for dyn SharedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedDependency({})", self.dependency_id())
    }
}

struct Inner<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    observable: BlockingObservable<V>,
    compute: Box<dyn Fn() -> V + Send + Sync>,
    dependencies: Vec<Box<dyn SharedDependency>>,
    _subscriptions: Vec<SharedSubscription>,
}

impl<V> Inner<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn invalidate(&self) -> Result<()> {
        trace!(id = %self.observable.id(), "re-evaluating shared binding");
        self.observable.set_computed(|| (self.compute)())
    }
}

/// A derived, read-only, thread-safe observable.
pub struct SharedBinding<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<Inner<V>>,
}

impl<V> SharedBinding<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a binding from a computation and the observables it reads.
    pub fn new<F>(compute: F, dependencies: Vec<Box<dyn SharedDependency>>) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        let mut unique: Vec<Box<dyn SharedDependency>> = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            if !unique
                .iter()
                .any(|known| known.dependency_id() == dependency.dependency_id())
            {
                unique.push(dependency);
            }
        }

        let observable = BlockingObservable::new(compute());

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<V>>| {
            let owner = weak.clone();
            let on_change: Arc<SharedInvalidationFn> = Arc::new(move || match owner.upgrade() {
                Some(inner) => inner.invalidate(),
                None => Ok(()),
            });

            let subscriptions = unique
                .iter()
                .map(|dependency| dependency.subscribe(Arc::clone(&on_change)))
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
            "created shared binding"
        );

        Self { inner }
    }

    /// Derive a value from a single observable.
    pub fn map<S, F>(f: F, source: &S) -> Self
    where
        S: SharedReadOnlyObservable + Clone + 'static,
        F: Fn(S::Value) -> V + Send + Sync + 'static,
    {
        let input = source.clone();
        Self::new(move || f(input.get()), vec![source.clone().boxed()])
    }

    /// Pick the value of `first` if `predicate(first, second)` holds, the
    /// value of `second` otherwise.
    pub fn ternary<A, B, P>(predicate: P, first: &A, second: &B) -> Self
    where
        A: SharedReadOnlyObservable<Value = V> + Clone + 'static,
        B: SharedReadOnlyObservable<Value = V> + Clone + 'static,
        P: Fn(&V, &V) -> bool + Send + Sync + 'static,
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
    pub fn select<C>(condition: C, value1: V, value2: V) -> Self
    where
        C: Fn() -> bool + Send + Sync + 'static,
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
    pub fn dependencies(&self) -> impl Iterator<Item = &(dyn SharedDependency + 'static)> + '_ {
        self.inner.dependencies.iter().map(|dependency| &**dependency)
    }

    /// Whether `observable` is one of this binding's dependencies.
    pub fn depends_on<O>(&self, observable: &O) -> bool
    where
        O: SharedReadOnlyObservable + ?Sized,
    {
        self.dependencies()
            .any(|dependency| dependency.dependency_id() == observable.id())
    }

    /// Whether no thread is currently re-evaluating this binding.
    pub fn is_valid(&self) -> bool {
        self.inner.observable.is_valid()
    }
}

/// Logic combinators.
impl SharedBinding<bool> {
    /// Whether both observables hold equal values.
    pub fn equals<A, B>(first: &A, second: &B) -> Self
    where
        A: SharedReadOnlyObservable + Clone + 'static,
        B: SharedReadOnlyObservable<Value = A::Value> + Clone + 'static,
    {
        Self::compare(first, second, |a, b| a == b)
    }

    /// Whether the observables hold different values.
    pub fn not_equals<A, B>(first: &A, second: &B) -> Self
    where
        A: SharedReadOnlyObservable + Clone + 'static,
        B: SharedReadOnlyObservable<Value = A::Value> + Clone + 'static,
    {
        Self::compare(first, second, |a, b| a != b)
    }

    /// Whether an optional value is absent.
    pub fn is_none<O, T>(observable: &O) -> Self
    where
        O: SharedReadOnlyObservable<Value = Option<T>> + Clone + 'static,
        T: 'static,
    {
        Self::map(|value: Option<T>| value.is_none(), observable)
    }

    /// Whether an optional value is present.
    pub fn is_some<O, T>(observable: &O) -> Self
    where
        O: SharedReadOnlyObservable<Value = Option<T>> + Clone + 'static,
        T: 'static,
    {
        Self::map(|value: Option<T>| value.is_some(), observable)
    }

    /// Logical conjunction.
    pub fn and<A, B>(first: &A, second: &B) -> Self
    where
        A: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
        B: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
    {
        Self::combine(first, second, |a, b| a && b)
    }

    /// Logical disjunction.
    pub fn or<A, B>(first: &A, second: &B) -> Self
    where
        A: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
        B: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
    {
        Self::combine(first, second, |a, b| a || b)
    }

    /// Exclusive disjunction.
    pub fn xor<A, B>(first: &A, second: &B) -> Self
    where
        A: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
        B: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
    {
        Self::combine(first, second, |a, b| a != b)
    }

    /// Logical negation.
    pub fn negate<A>(observable: &A) -> Self
    where
        A: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
    {
        Self::map(|value: bool| !value, observable)
    }

    fn compare<A, B, F>(first: &A, second: &B, predicate: F) -> Self
    where
        A: SharedReadOnlyObservable + Clone + 'static,
        B: SharedReadOnlyObservable<Value = A::Value> + Clone + 'static,
        F: Fn(&A::Value, &A::Value) -> bool + Send + Sync + 'static,
    {
        let (a, b) = (first.clone(), second.clone());
        Self::new(
            move || predicate(&a.get(), &b.get()),
            vec![first.clone().boxed(), second.clone().boxed()],
        )
    }

    fn combine<A, B, F>(first: &A, second: &B, operator: F) -> Self
    where
        A: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
        B: SharedReadOnlyObservable<Value = bool> + Clone + 'static,
        F: Fn(bool, bool) -> bool + Send + Sync + 'static,
    {
        let (a, b) = (first.clone(), second.clone());
        Self::new(
            move || operator(a.get(), b.get()),
            vec![first.clone().boxed(), second.clone().boxed()],
        )
    }
}

impl<V> SharedReadOnlyObservable for SharedBinding<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = V;

    fn id(&self) -> ObservableId {
        self.inner.observable.id()
    }

    fn get(&self) -> V {
        self.inner.observable.get()
    }

    fn register_listener(&self, listener: &SharedChangeListener<V>) {
        self.inner.observable.register_listener(listener);
    }

    fn remove_listener(&self, listener: &SharedChangeListener<V>) {
        self.inner.observable.remove_listener(listener);
    }
}

impl<V> Clone for SharedBinding<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for SharedBinding<V>
where
    V: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBinding")
            .field("id", &self.id())
            .field("value", &self.get())
            .field("dependencies", &self.inner.dependencies)
            .finish()
    }
}
