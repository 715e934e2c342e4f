//! Decisions on whether a fallback stage applies.

use resilience_proxy_core::{BoxError, ErrorType, MethodDescriptor};
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;

/// What the decorated call produced.
#[derive(Clone, Copy)]
pub enum Outcome<'a> {
    /// The call returned a value.
    Success(&'a dyn Any),
    /// The call failed.
    Failure(&'a BoxError),
}

impl<'a> Outcome<'a> {
    /// The error, if the call failed.
    pub fn error(self) -> Option<&'a BoxError> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(error) => Some(error),
        }
    }
}

impl fmt::Debug for Outcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(_) => f.write_str("Success(..)"),
            Outcome::Failure(error) => f.debug_tuple("Failure").field(error).finish(),
        }
    }
}

/// Decides whether a fallback stage replaces an outcome.
pub trait FallbackHandler: Send + Sync + 'static {
    /// Returns true if the stage's fallback should be invoked for `outcome`.
    fn should_fallback(&self, method: &MethodDescriptor, outcome: Outcome<'_>) -> bool;
}

/// Falls back on every error.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyError;

impl FallbackHandler for AnyError {
    fn should_fallback(&self, _method: &MethodDescriptor, outcome: Outcome<'_>) -> bool {
        matches!(outcome, Outcome::Failure(_))
    }
}

/// Falls back on errors of one type.
#[derive(Debug, Clone, Copy)]
pub struct ErrorTypeHandler {
    error: ErrorType,
}

impl ErrorTypeHandler {
    /// Falls back on errors of type `E`.
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            error: ErrorType::of::<E>(),
        }
    }
}

impl FallbackHandler for ErrorTypeHandler {
    fn should_fallback(&self, _method: &MethodDescriptor, outcome: Outcome<'_>) -> bool {
        match outcome {
            Outcome::Failure(error) => self.error.matches(&**error),
            Outcome::Success(_) => false,
        }
    }
}

/// Falls back on errors accepted by a predicate.
pub struct ErrorPredicate<F> {
    predicate: F,
}

impl<F> ErrorPredicate<F>
where
    F: Fn(&BoxError) -> bool + Send + Sync + 'static,
{
    /// Creates the handler.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> FallbackHandler for ErrorPredicate<F>
where
    F: Fn(&BoxError) -> bool + Send + Sync + 'static,
{
    fn should_fallback(&self, _method: &MethodDescriptor, outcome: Outcome<'_>) -> bool {
        match outcome {
            Outcome::Failure(error) => (self.predicate)(error),
            Outcome::Success(_) => false,
        }
    }
}

/// Falls back on successful results of type `T` accepted by a predicate.
///
/// Errors and results of other types never trigger it.
pub struct ResultPredicate<T, F> {
    predicate: F,
    _result: PhantomData<fn(&T)>,
}

impl<T, F> ResultPredicate<T, F>
where
    T: 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    /// Creates the handler.
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _result: PhantomData,
        }
    }
}

impl<T, F> FallbackHandler for ResultPredicate<T, F>
where
    T: 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn should_fallback(&self, _method: &MethodDescriptor, outcome: Outcome<'_>) -> bool {
        match outcome {
            Outcome::Success(value) => value.downcast_ref::<T>().is_some_and(&self.predicate),
            Outcome::Failure(_) => false,
        }
    }
}
