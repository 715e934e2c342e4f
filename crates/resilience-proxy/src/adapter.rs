//! Adapting a trait method into an [`Invocation`].
//!
//! A [`Target`] is the method body as a plain function pointer over the
//! interface, so the same target can be applied to the wrapped instance or to
//! a fallback implementing the same interface. Errors returned by the target
//! reach the decorators exactly as the implementation produced them.

use futures::future::BoxFuture;
use resilience_proxy_core::{BoxError, Invocation, MethodDescriptor};
use std::sync::Arc;

/// Synchronous method body.
pub type SyncTarget<S, A, T> = fn(&S, A) -> Result<T, BoxError>;

/// Future-returning method body.
pub type AsyncTarget<S, A, T> = fn(&S, A) -> BoxFuture<'static, Result<T, BoxError>>;

/// A method of interface `S` taking arguments `A` and producing `T`.
pub enum Target<S: ?Sized, A, T> {
    /// Returns its result directly.
    Sync(SyncTarget<S, A, T>),
    /// Returns a future of its result.
    Async(AsyncTarget<S, A, T>),
}

impl<S: ?Sized, A, T> Clone for Target<S, A, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized, A, T> Copy for Target<S, A, T> {}

impl<S, A, T> Target<S, A, T>
where
    S: ?Sized + Send + Sync + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    /// Binds the method to `instance`, producing the innermost callable of a chain.
    pub fn adapt(self, instance: Arc<S>, method: Arc<MethodDescriptor>) -> Invocation<A, T> {
        match self {
            Target::Sync(f) => Invocation::from_sync(method, move |args: A| f(&*instance, args)),
            Target::Async(f) => Invocation::from_async(method, move |args: A| f(&*instance, args)),
        }
    }

    /// Calls the method on `instance`, blocking on asynchronous bodies.
    pub(crate) fn call_blocking(self, instance: &S, args: A) -> Result<T, BoxError> {
        match self {
            Target::Sync(f) => f(instance, args),
            Target::Async(f) => futures::executor::block_on(f(instance, args)),
        }
    }

    /// Calls the method on `instance` as a future.
    pub(crate) fn call_future(
        self,
        instance: &S,
        args: A,
    ) -> BoxFuture<'static, Result<T, BoxError>> {
        match self {
            Target::Sync(f) => Box::pin(futures::future::ready(f(instance, args))),
            Target::Async(f) => f(instance, args),
        }
    }
}
