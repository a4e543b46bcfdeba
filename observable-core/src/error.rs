//! Error types shared by both observable models.

use thiserror::Error;

use crate::observable::ObservableId;

/// Boxed error produced by validators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ObservableError>;

/// Errors raised by observables, bindings and listener registries.
#[derive(Debug, Error)]
pub enum ObservableError {
    /// The operation conflicts with the current binding state.
    #[error(transparent)]
    InvalidOperation(#[from] InvalidOperation),

    /// The validator refused the candidate value. The stored value is unchanged.
    #[error("value rejected by validator: {0}")]
    ValidationRejected(#[source] BoxError),

    /// An argument can never be accepted, regardless of state.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl ObservableError {
    /// Wrap a validator error.
    pub fn rejected(error: impl Into<BoxError>) -> Self {
        Self::ValidationRejected(error.into())
    }

    /// Whether this error is a binding state conflict.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::InvalidOperation(_))
    }
}

/// State conflicts between an operation and the binding state of an observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidOperation {
    #[error("cannot change observable: value is bound to another observable")]
    BoundToUpstream,

    #[error("cannot bind to observable: already in another binding relationship")]
    AlreadyBound,

    #[error("cannot unbind: no unidirectional binding relationship present")]
    NotBound,

    #[error("cannot unbind: not bidirectionally bound to observable {0}")]
    NotBoundTo(ObservableId),

    #[error("cannot unbind: no binding relationships present")]
    NoBindings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_operation_converts_into_error() {
        let error: ObservableError = InvalidOperation::NoBindings.into();
        assert!(error.is_invalid_operation());
        assert_eq!(
            error.to_string(),
            "cannot unbind: no binding relationships present"
        );
    }

    #[test]
    fn rejection_keeps_validator_message_as_source() {
        let error = ObservableError::rejected("too large");
        assert!(!error.is_invalid_operation());
        assert_eq!(error.to_string(), "value rejected by validator: too large");

        let source = std::error::Error::source(&error).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("too large"));
    }
}
