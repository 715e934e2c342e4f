//! The uniform callable wrapped by every decorator.
//!
//! A proxied method is either synchronous (returns its result directly) or
//! asynchronous (returns a future). [`Invocation`] carries one of the two
//! shapes together with the [`MethodDescriptor`] of the method it belongs to,
//! so decorators can branch on the shape without knowing anything else about
//! the target.

use crate::error::{BoxError, ErrorType};
use futures::future::{self, BoxFuture};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A synchronous callable.
pub type SyncFn<A, T> = Arc<dyn Fn(A) -> Result<T, BoxError> + Send + Sync>;

/// A future-returning callable.
pub type AsyncFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Return shape of a proxied method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// The method returns its result directly.
    Sync,
    /// The method returns a future of its result.
    Async,
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallShape::Sync => f.write_str("sync"),
            CallShape::Async => f.write_str("async"),
        }
    }
}

/// Cache key identifying a method by name and parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodKey {
    name: &'static str,
    params: &'static [&'static str],
}

impl MethodKey {
    /// Creates a key.
    pub fn new(name: &'static str, params: &'static [&'static str]) -> Self {
        Self { name, params }
    }

    /// Returns the method name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Describes one method of a proxied interface.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    interface: &'static str,
    key: MethodKey,
    shape: CallShape,
    declared_errors: Vec<ErrorType>,
}

impl MethodDescriptor {
    /// Creates a descriptor with no declared errors.
    pub fn new(
        interface: &'static str,
        name: &'static str,
        params: &'static [&'static str],
        shape: CallShape,
    ) -> Self {
        Self {
            interface,
            key: MethodKey::new(name, params),
            shape,
            declared_errors: Vec::new(),
        }
    }

    /// Declares error types the method is allowed to signal.
    pub fn with_declared_errors(mut self, errors: impl IntoIterator<Item = ErrorType>) -> Self {
        self.declared_errors.extend(errors);
        self
    }

    /// Name of the declaring interface.
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Method name.
    pub fn name(&self) -> &'static str {
        self.key.name
    }

    /// Parameter type names, in order.
    pub fn params(&self) -> &'static [&'static str] {
        self.key.params
    }

    /// The cache key for this method.
    pub fn key(&self) -> MethodKey {
        self.key
    }

    /// Return shape.
    pub fn shape(&self) -> CallShape {
        self.shape
    }

    /// Error types the method declares.
    pub fn declared_errors(&self) -> &[ErrorType] {
        &self.declared_errors
    }

    /// Returns true if the method declares `error`.
    pub fn declares(&self, error: &ErrorType) -> bool {
        self.declared_errors.contains(error)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.interface,
            self.key.name,
            self.key.params.join(", ")
        )
    }
}

/// The callable half of an [`Invocation`].
pub enum Call<A, T> {
    /// Synchronous callable.
    Sync(SyncFn<A, T>),
    /// Future-returning callable.
    Async(AsyncFn<A, T>),
}

impl<A, T> Clone for Call<A, T> {
    fn clone(&self) -> Self {
        match self {
            Call::Sync(f) => Call::Sync(Arc::clone(f)),
            Call::Async(f) => Call::Async(Arc::clone(f)),
        }
    }
}

impl<A, T> Call<A, T> {
    /// Shape of this callable.
    pub fn shape(&self) -> CallShape {
        match self {
            Call::Sync(_) => CallShape::Sync,
            Call::Async(_) => CallShape::Async,
        }
    }
}

/// A method call reduced to `invoke(args) -> result`.
///
/// Cloning is cheap; both halves are reference counted.
pub struct Invocation<A, T> {
    method: Arc<MethodDescriptor>,
    call: Call<A, T>,
}

impl<A, T> Invocation<A, T> {
    /// Creates an invocation from a callable.
    pub fn new(method: Arc<MethodDescriptor>, call: Call<A, T>) -> Self {
        Self { method, call }
    }

    /// Wraps a synchronous callable.
    pub fn from_sync<F>(method: Arc<MethodDescriptor>, f: F) -> Self
    where
        F: Fn(A) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::new(method, Call::Sync(Arc::new(f)))
    }

    /// Wraps a future-returning callable.
    pub fn from_async<F>(method: Arc<MethodDescriptor>, f: F) -> Self
    where
        F: Fn(A) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync + 'static,
    {
        Self::new(method, Call::Async(Arc::new(f)))
    }

    /// The method this invocation belongs to.
    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    /// The wrapped callable.
    pub fn callable(&self) -> &Call<A, T> {
        &self.call
    }

    /// Shape of the wrapped callable.
    pub fn shape(&self) -> CallShape {
        self.call.shape()
    }

    /// Replaces the callable, keeping the method.
    ///
    /// This is how decorators rebuild an invocation around a wrapped callable.
    pub fn map_call<F>(self, f: F) -> Self
    where
        F: FnOnce(Call<A, T>) -> Call<A, T>,
    {
        Self {
            method: self.method,
            call: f(self.call),
        }
    }
}

impl<A, T> Clone for Invocation<A, T> {
    fn clone(&self) -> Self {
        Self {
            method: Arc::clone(&self.method),
            call: self.call.clone(),
        }
    }
}

impl<A, T> fmt::Debug for Invocation<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("method", &format_args!("{}", self.method))
            .field("shape", &self.call.shape())
            .finish()
    }
}

impl<A, T> tower_service::Service<A> for Invocation<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    type Response = T;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<T, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, args: A) -> Self::Future {
        match &self.call {
            Call::Sync(f) => Box::pin(future::ready(f(args))),
            Call::Async(f) => f(args),
        }
    }
}
