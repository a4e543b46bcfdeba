//! Construction-time configuration for blocking observables.

use super::blocking::BlockingObservable;
use super::traits::SharedValidator;
use crate::error::BoxError;

/// Lock hand-over policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fairness {
    /// Released locks may be re-acquired by the releasing thread before
    /// waiting threads get a chance. Higher throughput.
    #[default]
    Unfair,

    /// Released locks are handed to a waiting thread, if any.
    Fair,
}

impl Fairness {
    /// Whether locks are released fairly.
    pub fn is_fair(self) -> bool {
        self == Self::Fair
    }
}

/// Builder for [`BlockingObservable`].
///
/// ```rust
/// use observable_core::concurrent::{BlockingObservable, Fairness};
///
/// let port = BlockingObservable::builder(8080u16)
///     .validator(|port: &u16| if *port == 0 { Err("port 0".into()) } else { Ok(()) })
///     .fairness(Fairness::Fair)
///     .build();
/// ```
pub struct BlockingObservableBuilder<V> {
    value: V,
    validator: Option<Box<SharedValidator<V>>>,
    fairness: Fairness,
}

impl<V> BlockingObservableBuilder<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(value: V) -> Self {
        Self {
            value,
            validator: None,
            fairness: Fairness::default(),
        }
    }

    /// Reject candidate values for which `validator` returns an error.
    ///
    /// The initial value is not validated.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&V) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Set the lock hand-over policy.
    pub fn fairness(mut self, fairness: Fairness) -> Self {
        self.fairness = fairness;
        self
    }

    /// Create the observable.
    pub fn build(self) -> BlockingObservable<V> {
        BlockingObservable::from_parts(self.value, self.validator, self.fairness)
    }
}
